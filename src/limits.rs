//! # Limits Module
//!
//! Classifies free-text system notices into quota events.
//!
//! The wording of these notices is not a stable grammar, so everything here is
//! keyword matching over lower-cased text:
//! - a notice is relevant when it mentions a quota-ish keyword
//! - it is a **reset** only when it speaks of restoration and never of
//!   exhaustion; everything else relevant is a **hit**
//! - the period is daily unless the text points to a week
//! - a mentioned token count (`1,000,000 tokens`, `500k`) is extracted

use anyhow::Result;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{LimitEvent, LimitEventType, LimitType, StoredLimitEvent, UsageSummary};

const RELEVANCE_KEYWORDS: &[&str] = &["limit", "quota", "rate", "exceeded", "throttle", "resets"];

const RESET_PHRASES: &[&str] = &["has been reset", "limit reset", "restored", "renewed"];

// Any of these vetoes a reset reading: "It resets in 6 hours" after "hit your
// limit" is still a hit notice.
const HIT_PHRASES: &[&str] = &["hit", "reached", "exceeded"];

const DAILY_PHRASES: &[&str] = &["daily", "24 hour", "today"];
const WEEKLY_PHRASES: &[&str] = &["weekly", "7 day", "week"];

static TOKEN_COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,3}(?:,\d{3})*|\d+)\s*(tokens?|k)").unwrap());

/// Outcome of classifying one notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaSignal {
    pub event_type: LimitEventType,
    pub limit_type: LimitType,
    pub tokens_used: u64,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

pub fn is_limit_message(text: &str) -> bool {
    contains_any(&text.to_lowercase(), RELEVANCE_KEYWORDS)
}

pub fn classify_event_type(text: &str) -> LimitEventType {
    let lower = text.to_lowercase();
    if contains_any(&lower, RESET_PHRASES) && !contains_any(&lower, HIT_PHRASES) {
        LimitEventType::Reset
    } else {
        LimitEventType::Hit
    }
}

pub fn classify_period(text: &str) -> LimitType {
    let lower = text.to_lowercase();
    if contains_any(&lower, DAILY_PHRASES) {
        LimitType::Daily
    } else if contains_any(&lower, WEEKLY_PHRASES) {
        LimitType::Weekly
    } else {
        LimitType::Daily
    }
}

/// First token count mentioned in the text; 0 when there is none.
pub fn extract_token_count(text: &str) -> u64 {
    let lower = text.to_lowercase();
    let Some(caps) = TOKEN_COUNT_RE.captures(&lower) else {
        return 0;
    };
    let digits = caps[1].replace(',', "");
    let Ok(count) = digits.parse::<u64>() else {
        return 0;
    };
    if &caps[2] == "k" {
        count.saturating_mul(1000)
    } else {
        count
    }
}

/// Classify a system notice. Returns `None` for text that is not about quotas.
pub fn classify(text: &str) -> Option<QuotaSignal> {
    if !is_limit_message(text) {
        return None;
    }
    Some(QuotaSignal {
        event_type: classify_event_type(text),
        limit_type: classify_period(text),
        tokens_used: extract_token_count(text),
    })
}

/// Persistence for limit events. Events are append-only.
pub trait LimitEventStore {
    /// Store an event recorded at `at` with the usage accumulated before it.
    /// Returns the new row id, or `None` when an identical event already exists.
    fn insert_limit_event(
        &self,
        event: &LimitEvent,
        at: DateTime<Utc>,
        usage: &UsageSummary,
    ) -> Result<Option<i64>>;

    fn last_limit_event_time(&self) -> Result<Option<DateTime<Utc>>>;

    /// Usage of sessions that started after the most recent event, or of all
    /// sessions when there is none.
    fn usage_since_last_limit(&self) -> Result<UsageSummary>;

    /// Events at or after `since`, newest first.
    fn limit_events_since(&self, since: DateTime<Utc>) -> Result<Vec<StoredLimitEvent>>;

    /// Latest `count` hit events of one period, newest first.
    fn limit_hits_by_type(&self, limit_type: LimitType, count: usize)
    -> Result<Vec<StoredLimitEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_with_reset_time_stays_a_hit() {
        let s = classify("You've hit your daily limit. It resets in 6 hours.").unwrap();
        assert_eq!(s.event_type, LimitEventType::Hit);
        assert_eq!(s.limit_type, LimitType::Daily);
    }

    #[test]
    fn explicit_reset_is_a_reset() {
        let s = classify("Your daily limit has been reset.").unwrap();
        assert_eq!(s.event_type, LimitEventType::Reset);
        assert_eq!(s.limit_type, LimitType::Daily);
    }

    #[test]
    fn reset_phrases_without_veto() {
        for text in [
            "Your quota has been restored.",
            "Weekly limit reset complete",
            "Your rate allowance was renewed",
        ] {
            assert_eq!(
                classify(text).map(|s| s.event_type),
                Some(LimitEventType::Reset),
                "{text}"
            );
        }
    }

    #[test]
    fn hit_words_veto_reset() {
        for text in [
            "Limit reached; it will be restored tomorrow",
            "Quota exceeded. Your limit has been reset for next week",
            "You hit the limit, it is renewed at 5pm",
        ] {
            assert_eq!(
                classify(text).map(|s| s.event_type),
                Some(LimitEventType::Hit),
                "{text}"
            );
        }
    }

    #[test]
    fn irrelevant_text_is_ignored() {
        assert!(classify("Conversation compacted").is_none());
        assert!(classify("").is_none());
    }

    #[test]
    fn weekly_period_detection() {
        assert_eq!(classify_period("You've reached your weekly limit"), LimitType::Weekly);
        assert_eq!(classify_period("7 day usage cap"), LimitType::Weekly);
        assert_eq!(classify_period("Limit resets next week"), LimitType::Weekly);
    }

    #[test]
    fn daily_wins_over_weekly_and_is_default() {
        assert_eq!(classify_period("daily and weekly limits"), LimitType::Daily);
        assert_eq!(classify_period("24 hour window"), LimitType::Daily);
        assert_eq!(classify_period("limit reached"), LimitType::Daily);
    }

    #[test]
    fn token_counts() {
        let cases = [
            ("You've used 1000 tokens", 1000),
            ("You've used 1,000,000 tokens and hit your limit.", 1_000_000),
            ("500 tokens remaining", 500),
            ("1 token left", 1),
            ("Used 500k of your quota", 500_000),
            ("Used 500K of your quota", 500_000),
            ("No tokens mentioned", 0),
            ("", 0),
        ];
        for (text, expected) in cases {
            assert_eq!(extract_token_count(text), expected, "{text}");
        }
    }

    #[test]
    fn classify_carries_token_count() {
        let s = classify("You've used 1,000,000 tokens and hit your limit.").unwrap();
        assert_eq!(s.tokens_used, 1_000_000);
        assert_eq!(s.event_type, LimitEventType::Hit);
    }

    #[test]
    fn rate_keyword_is_broad() {
        // Known false positive: "generate" contains "rate".
        assert!(is_limit_message("Failed to generate a title"));
    }
}
