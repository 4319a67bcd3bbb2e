use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::ratelimit::LimitEvent;

/// Metrics extracted from one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatistics {
    // Interaction counts
    pub user_prompts: u64,
    pub assistant_responses: u64,
    pub tool_calls: u64,
    pub tools_breakdown: BTreeMap<String, u64>,
    pub errors_count: u64,

    // File tracking
    pub files_accessed: BTreeSet<String>,
    pub files_modified: BTreeSet<String>,

    // Token usage
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub thinking_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,

    // Metadata
    pub model: String,
    pub git_branch: String,
    pub tool_version: String,
    pub summary: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SessionStatistics {
    /// Input + output + thinking. Cache reads and writes are priced separately
    /// and stay out of this total.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.thinking_tokens)
    }

    pub fn duration_seconds(&self) -> i64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).num_seconds(),
            _ => 0,
        }
    }
}

/// Everything extracted from one transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedTranscript {
    pub statistics: SessionStatistics,
    pub limit_events: Vec<LimitEvent>,
}

/// A session as persisted: identity and context from the hook plus the
/// parsed statistics and their estimated cost.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub instance_id: String,
    pub hostname: String,
    pub transcript_path: String,
    pub cwd: Option<String>,
    pub exit_reason: Option<String>,
    pub permission_mode: Option<String>,
    pub statistics: SessionStatistics,
    pub cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn total_tokens_excludes_cache() {
        let stats = SessionStatistics {
            input_tokens: 100,
            output_tokens: 50,
            thinking_tokens: 25,
            cache_read_tokens: 1000,
            cache_write_tokens: 500,
            ..Default::default()
        };
        assert_eq!(stats.total_tokens(), 175);
    }

    #[test]
    fn duration_requires_both_ends() {
        let mut stats = SessionStatistics::default();
        assert_eq!(stats.duration_seconds(), 0);

        stats.start_time = Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap());
        assert_eq!(stats.duration_seconds(), 0);

        stats.end_time = Some(Utc.with_ymd_and_hms(2025, 1, 15, 10, 1, 0).unwrap());
        assert_eq!(stats.duration_seconds(), 60);
    }
}
