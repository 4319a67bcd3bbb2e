//! # Tracker Module
//!
//! Records a finished session: cost estimate, window bookkeeping, the session
//! row itself, and any quota notices found in its transcript.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::limits::LimitEventStore;
use crate::models::{
    LimitEvent, LimitEventType, LimitType, ParsedTranscript, SessionEndHook, SessionRecord,
    SessionStatistics, StoredLimitEvent, UsageSummary, WindowKind,
};
use crate::pricing::PricingTable;
use crate::window::{self, WindowMetrics, WindowStore};

pub trait SessionStore {
    fn save_session(&self, record: &SessionRecord) -> Result<()>;
}

impl SessionStore for crate::db::Database {
    fn save_session(&self, record: &SessionRecord) -> Result<()> {
        self.upsert_session(record)
    }
}

/// Where a session was recorded from.
#[derive(Debug, Clone)]
pub struct Identity {
    pub instance_id: String,
    pub hostname: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub session_id: String,
    pub cost_usd: f64,
    pub total_tokens: u64,
    pub windows_reset: Vec<WindowKind>,
    pub events_recorded: usize,
    pub events_skipped: usize,
    pub limits_learned: Vec<LearnedLimit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LearnedLimit {
    pub window: WindowKind,
    pub tokens: f64,
    pub at: DateTime<Utc>,
}

/// Outcome of recording a batch of limit events.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LimitRecording {
    pub recorded: usize,
    pub skipped: usize,
    pub learned: Vec<LearnedLimit>,
}

pub struct Tracker<'a, S> {
    store: &'a S,
    pricing: &'a PricingTable,
    identity: Identity,
}

impl<'a, S> Tracker<'a, S>
where
    S: SessionStore + WindowStore + LimitEventStore,
{
    pub fn new(store: &'a S, pricing: &'a PricingTable, identity: Identity) -> Self {
        Self {
            store,
            pricing,
            identity,
        }
    }

    pub fn session_cost(&self, stats: &SessionStatistics) -> f64 {
        self.pricing.cost(
            &stats.model,
            stats.input_tokens,
            stats.output_tokens,
            stats.cache_read_tokens,
            stats.cache_write_tokens,
        )
    }

    /// Persist one parsed session. Events without a timestamp are recorded
    /// at `now`.
    pub fn ingest(
        &self,
        hook: &SessionEndHook,
        parsed: &ParsedTranscript,
        now: DateTime<Utc>,
    ) -> Result<IngestReport> {
        let stats = &parsed.statistics;
        let cost = self.session_cost(stats);

        // Windows move before the session is saved so its usage lands in the
        // window it opened.
        let mut windows_reset = Vec::new();
        if let Some(start) = stats.start_time {
            for kind in WindowKind::ALL {
                if window::reset_if_expired(self.store, kind, start)
                    .with_context(|| format!("Failed to check {} window", kind.as_str()))?
                {
                    windows_reset.push(kind);
                }
            }
        }

        let record = SessionRecord {
            session_id: hook.session_id.clone(),
            instance_id: self.identity.instance_id.clone(),
            hostname: self.identity.hostname.clone(),
            transcript_path: hook.transcript_path.clone(),
            cwd: hook.cwd.clone(),
            exit_reason: hook.reason.clone(),
            permission_mode: hook.permission_mode.clone(),
            statistics: stats.clone(),
            cost_usd: cost,
        };
        self.store.save_session(&record)?;
        tracing::debug!(
            session = %hook.session_id,
            tokens = stats.total_tokens(),
            cost,
            "session saved"
        );

        let recording = self.record_limit_hits(&parsed.limit_events, now)?;

        Ok(IngestReport {
            session_id: hook.session_id.clone(),
            cost_usd: cost,
            total_tokens: stats.total_tokens(),
            windows_reset,
            events_recorded: recording.recorded,
            events_skipped: recording.skipped,
            limits_learned: recording.learned,
        })
    }

    /// Store events with the usage accumulated since the previous event, and
    /// recalibrate window limits from new hits.
    pub fn record_limit_hits(
        &self,
        events: &[LimitEvent],
        now: DateTime<Utc>,
    ) -> Result<LimitRecording> {
        let mut out = LimitRecording::default();
        for event in events {
            let at = event.timestamp.unwrap_or(now);
            let usage = self
                .store
                .usage_since_last_limit()
                .context("Failed to get usage since last limit")?;
            let inserted = self
                .store
                .insert_limit_event(event, at, &usage)
                .context("Failed to save limit event")?;
            if inserted.is_none() {
                tracing::debug!(message = %event.message, "limit event already recorded");
                out.skipped += 1;
                continue;
            }
            out.recorded += 1;
            tracing::debug!(
                event = event.event_type.as_str(),
                period = event.limit_type.as_str(),
                sessions = usage.sessions_count,
                cost = usage.total_cost_usd,
                "recorded limit event"
            );
            if event.event_type == LimitEventType::Hit
                && let Some(learned) = self.learn_limit(event, at)?
            {
                out.learned.push(learned);
            }
        }
        Ok(out)
    }

    fn learn_limit(&self, event: &LimitEvent, at: DateTime<Utc>) -> Result<Option<LearnedLimit>> {
        let kind = WindowKind::for_limit(event.limit_type);
        let tokens = if event.tokens_used > 0 {
            event.tokens_used
        } else {
            let config = self.store.plan_config()?;
            match config.window(kind).start_time {
                Some(start) => self.store.usage_since(start)?.total_tokens(),
                None => 0,
            }
        };
        if tokens == 0 {
            tracing::debug!(window = kind.as_str(), "no usage to learn a limit from");
            return Ok(None);
        }
        let limit = tokens as f64;
        self.store.set_learned_limit(kind, limit, at)?;
        tracing::info!(window = kind.as_str(), limit, "learned token limit");
        Ok(Some(LearnedLimit {
            window: kind,
            tokens: limit,
            at,
        }))
    }

    pub fn recent_limit_events(&self, days: i64, now: DateTime<Utc>) -> Result<Vec<StoredLimitEvent>> {
        self.store.limit_events_since(now - Duration::days(days))
    }

    pub fn limit_events_by_type(
        &self,
        limit_type: LimitType,
        count: usize,
    ) -> Result<Vec<StoredLimitEvent>> {
        self.store.limit_hits_by_type(limit_type, count)
    }

    pub fn current_usage(&self) -> Result<UsageSummary> {
        self.store.usage_since_last_limit()
    }

    pub fn last_limit_time(&self) -> Result<Option<DateTime<Utc>>> {
        self.store.last_limit_event_time()
    }

    pub fn window_status(&self, kind: WindowKind, now: DateTime<Utc>) -> Result<Option<WindowMetrics>> {
        window::window_status(self.store, kind, now)
    }
}
