use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a quota notice reports exhaustion or restoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitEventType {
    Hit,
    Reset,
}

/// Period of the quota a notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    Daily,
    Weekly,
}

impl LimitEventType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "hit" => Some(Self::Hit),
            "reset" => Some(Self::Reset),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Reset => "reset",
        }
    }
}

impl LimitType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
        }
    }
}

/// A quota event found in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LimitEvent {
    pub event_type: LimitEventType,
    pub limit_type: LimitType,
    /// Time of the system line, or of the latest line before it when the
    /// notice itself carries no timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    pub message: String,
    /// Token count mentioned in the notice, 0 when none.
    pub tokens_used: u64,
}

/// Aggregate usage over a span of persisted sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageSummary {
    pub sessions_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_tokens: u64,
    pub total_cost_usd: f64,
}

impl UsageSummary {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.thinking_tokens)
    }
}

/// A limit event as stored, with the usage accumulated since the event
/// before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredLimitEvent {
    pub id: i64,
    pub event_type: LimitEventType,
    pub limit_type: LimitType,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub tokens_used: u64,
    pub usage: UsageSummary,
}
