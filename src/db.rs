//! SQLite persistence for sessions, limit events, and plan/window state.
//!
//! This module provides:
//! - SQLite database initialization with schema versioning
//! - Session upserts keyed by session id
//! - Append-only limit events with usage snapshots
//! - The single plan configuration row and its conditional window updates
//! - Concurrent access support via WAL mode
//!
//! Timestamps are stored as Unix epoch milliseconds.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::limits::LimitEventStore;
use crate::models::{
    LimitEvent, LimitEventType, LimitType, MAX_WINDOW_HOURS, PlanConfig, PlanType, SessionRecord,
    SessionStatistics, StoredLimitEvent, UsageSummary, UsageWindow, WindowKind,
    plan::DEFAULT_WINDOW_HOURS,
};
use crate::window::WindowStore;

pub const DB_PATH_ENV: &str = "CLAUDE_WATCHER_DB_PATH";

const SCHEMA_VERSION: &str = "1";

/// Metadata value with optional timestamp
#[derive(Debug, Clone)]
pub struct MetadataEntry {
    pub value: String,
    pub updated_at: Option<i64>,
}

/// Get the database file path
///
/// Checks `CLAUDE_WATCHER_DB_PATH` environment variable first,
/// falls back to `~/.claude/watcher.db`
pub fn get_db_path() -> Result<PathBuf> {
    if let Ok(custom_path) = env::var(DB_PATH_ENV)
        && !custom_path.is_empty()
    {
        return Ok(PathBuf::from(custom_path));
    }
    Ok(crate::utils::claude_dir()?.join("watcher.db"))
}

fn to_ms(t: DateTime<Utc>) -> i64 {
    t.timestamp_millis()
}

fn from_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

/// SQLite integers are signed; counters past `i64::MAX` are stored clamped.
fn clamp_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

fn is_lock_error(e: &rusqlite::Error) -> bool {
    let msg = e.to_string();
    msg.contains("locked") || msg.contains("busy")
}

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at the default location.
    pub fn open() -> Result<Self> {
        Self::open_at(&get_db_path()?)
    }

    /// Open (creating if needed) the database at `path` with WAL mode and
    /// retry logic.
    ///
    /// Concurrent hooks can race on first-time schema creation, so "database
    /// locked" errors are retried with a growing delay.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let mut attempts = 0;
        let max_attempts = 5;

        loop {
            match Self::try_open(path) {
                Ok(db) => return Ok(db),
                Err(e) if is_lock_error(&e) && attempts < max_attempts => {
                    attempts += 1;
                    tracing::debug!(attempts, error = %e, "database locked, retrying open");
                    thread::sleep(Duration::from_millis(100 * attempts));
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to open database {}", path.display()));
                }
            }
        }
    }

    fn try_open(path: &Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Fetch metadata value and optional timestamp
    pub fn get_metadata(&self, key: &str) -> Result<Option<MetadataEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value, updated_at FROM metadata WHERE key = ?1")?;
        let result = stmt
            .query_row(params![key], |row| {
                let value: String = row.get(0)?;
                let updated_at: Option<i64> = row.get(1)?;
                Ok(MetadataEntry { value, updated_at })
            })
            .optional()?;
        Ok(result)
    }

    /// Set metadata value with current timestamp
    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        let now = Utc::now().timestamp();
        self.conn.execute(
            "INSERT INTO metadata (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    /// Insert or update a session.
    ///
    /// Re-tracking a session replaces its statistics and keeps `created_at`.
    pub fn upsert_session(&self, record: &SessionRecord) -> Result<()> {
        let now = to_ms(Utc::now());
        let s = &record.statistics;
        let tools = serde_json::to_string(&s.tools_breakdown)?;
        let accessed = serde_json::to_string(&s.files_accessed)?;
        let modified = serde_json::to_string(&s.files_modified)?;

        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO sessions (
                session_id, instance_id, hostname, transcript_path, cwd, exit_reason,
                permission_mode, user_prompts, assistant_responses, tool_calls,
                tools_breakdown, errors_count, files_accessed, files_modified,
                input_tokens, output_tokens, thinking_tokens, cache_read_tokens,
                cache_write_tokens, model, git_branch, tool_version, summary,
                start_time_ms, end_time_ms, duration_seconds, cost_usd,
                created_at, updated_at
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?28
             )
             ON CONFLICT(session_id) DO UPDATE SET
                instance_id = excluded.instance_id,
                hostname = excluded.hostname,
                transcript_path = excluded.transcript_path,
                cwd = COALESCE(excluded.cwd, sessions.cwd),
                exit_reason = COALESCE(excluded.exit_reason, sessions.exit_reason),
                permission_mode = COALESCE(excluded.permission_mode, sessions.permission_mode),
                user_prompts = excluded.user_prompts,
                assistant_responses = excluded.assistant_responses,
                tool_calls = excluded.tool_calls,
                tools_breakdown = excluded.tools_breakdown,
                errors_count = excluded.errors_count,
                files_accessed = excluded.files_accessed,
                files_modified = excluded.files_modified,
                input_tokens = excluded.input_tokens,
                output_tokens = excluded.output_tokens,
                thinking_tokens = excluded.thinking_tokens,
                cache_read_tokens = excluded.cache_read_tokens,
                cache_write_tokens = excluded.cache_write_tokens,
                model = excluded.model,
                git_branch = excluded.git_branch,
                tool_version = excluded.tool_version,
                summary = excluded.summary,
                start_time_ms = excluded.start_time_ms,
                end_time_ms = excluded.end_time_ms,
                duration_seconds = excluded.duration_seconds,
                cost_usd = excluded.cost_usd,
                updated_at = excluded.updated_at",
        )?;

        stmt.execute(params![
            record.session_id,
            record.instance_id,
            record.hostname,
            record.transcript_path,
            record.cwd,
            record.exit_reason,
            record.permission_mode,
            clamp_i64(s.user_prompts),
            clamp_i64(s.assistant_responses),
            clamp_i64(s.tool_calls),
            tools,
            clamp_i64(s.errors_count),
            accessed,
            modified,
            clamp_i64(s.input_tokens),
            clamp_i64(s.output_tokens),
            clamp_i64(s.thinking_tokens),
            clamp_i64(s.cache_read_tokens),
            clamp_i64(s.cache_write_tokens),
            s.model,
            s.git_branch,
            s.tool_version,
            s.summary,
            s.start_time.map(to_ms),
            s.end_time.map(to_ms),
            s.duration_seconds(),
            record.cost_usd,
            now,
        ])
        .with_context(|| format!("Failed to save session {}", record.session_id))?;

        Ok(())
    }

    pub fn load_session(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, instance_id, hostname, transcript_path, cwd, exit_reason,
                    permission_mode, user_prompts, assistant_responses, tool_calls,
                    tools_breakdown, errors_count, files_accessed, files_modified,
                    input_tokens, output_tokens, thinking_tokens, cache_read_tokens,
                    cache_write_tokens, model, git_branch, tool_version, summary,
                    start_time_ms, end_time_ms, cost_usd
             FROM sessions WHERE session_id = ?1",
        )?;
        let row = stmt
            .query_row(params![session_id], |row| {
                let tools: String = row.get(10)?;
                let accessed: String = row.get(12)?;
                let modified: String = row.get(13)?;
                Ok((session_from_row(row)?, tools, accessed, modified))
            })
            .optional()?;

        let Some((mut record, tools, accessed, modified)) = row else {
            return Ok(None);
        };
        record.statistics.tools_breakdown =
            serde_json::from_str::<BTreeMap<String, u64>>(&tools).unwrap_or_default();
        record.statistics.files_accessed =
            serde_json::from_str::<BTreeSet<String>>(&accessed).unwrap_or_default();
        record.statistics.files_modified =
            serde_json::from_str::<BTreeSet<String>>(&modified).unwrap_or_default();
        Ok(Some(record))
    }

    pub fn session_count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(to_u64(count))
    }

    /// Change the plan. Window starts and learned limits are kept.
    pub fn set_plan(&self, plan: PlanType, window_hours: i64) -> Result<()> {
        anyhow::ensure!(
            (1..=MAX_WINDOW_HOURS).contains(&window_hours),
            "window hours must be between 1 and {MAX_WINDOW_HOURS}, got {window_hours}"
        );
        self.conn.execute(
            "UPDATE plan_config SET plan_type = ?1, window_hours = ?2, updated_at = ?3 WHERE id = 1",
            params![plan.as_str(), window_hours, to_ms(Utc::now())],
        )?;
        Ok(())
    }

    fn usage_where(&self, clause: &str, param: Option<i64>) -> Result<UsageSummary> {
        let sql = format!(
            "SELECT COUNT(*),
                    CAST(TOTAL(input_tokens) AS INTEGER),
                    CAST(TOTAL(output_tokens) AS INTEGER),
                    CAST(TOTAL(thinking_tokens) AS INTEGER),
                    COALESCE(SUM(cost_usd), 0.0)
             FROM sessions {clause}"
        );
        let map = |row: &Row<'_>| {
            Ok(UsageSummary {
                sessions_count: to_u64(row.get(0)?),
                input_tokens: to_u64(row.get(1)?),
                output_tokens: to_u64(row.get(2)?),
                thinking_tokens: to_u64(row.get(3)?),
                total_cost_usd: row.get(4)?,
            })
        };
        let usage = match param {
            Some(p) => self.conn.query_row(&sql, params![p], map)?,
            None => self.conn.query_row(&sql, [], map)?,
        };
        Ok(usage)
    }

    fn query_limit_events(
        &self,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<StoredLimitEvent>> {
        let sql = format!(
            "SELECT id, event_type, limit_type, timestamp_ms, message, tokens_used,
                    sessions_count, input_tokens, output_tokens, thinking_tokens, total_cost_usd
             FROM limit_events {clause}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params, limit_event_from_row)?;
        let mut events = Vec::new();
        for row in rows {
            if let Some(event) = row? {
                events.push(event);
            }
        }
        Ok(events)
    }
}

/// Initialize database schema
///
/// Creates tables and indexes if they don't exist, plus the single plan row.
fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER
        );
        INSERT OR IGNORE INTO metadata (key, value) VALUES ('schema_version', '{SCHEMA_VERSION}');
        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            instance_id TEXT NOT NULL,
            hostname TEXT NOT NULL,
            transcript_path TEXT NOT NULL,
            cwd TEXT,
            exit_reason TEXT,
            permission_mode TEXT,
            user_prompts INTEGER NOT NULL DEFAULT 0,
            assistant_responses INTEGER NOT NULL DEFAULT 0,
            tool_calls INTEGER NOT NULL DEFAULT 0,
            tools_breakdown TEXT NOT NULL DEFAULT '{{}}',
            errors_count INTEGER NOT NULL DEFAULT 0,
            files_accessed TEXT NOT NULL DEFAULT '[]',
            files_modified TEXT NOT NULL DEFAULT '[]',
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            thinking_tokens INTEGER NOT NULL DEFAULT 0,
            cache_read_tokens INTEGER NOT NULL DEFAULT 0,
            cache_write_tokens INTEGER NOT NULL DEFAULT 0,
            model TEXT NOT NULL DEFAULT '',
            git_branch TEXT NOT NULL DEFAULT '',
            tool_version TEXT NOT NULL DEFAULT '',
            summary TEXT NOT NULL DEFAULT '',
            start_time_ms INTEGER,
            end_time_ms INTEGER,
            duration_seconds INTEGER NOT NULL DEFAULT 0,
            cost_usd REAL NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_start ON sessions(start_time_ms);
        CREATE TABLE IF NOT EXISTS limit_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            limit_type TEXT NOT NULL,
            timestamp_ms INTEGER NOT NULL,
            message TEXT NOT NULL,
            tokens_used INTEGER NOT NULL DEFAULT 0,
            sessions_count INTEGER NOT NULL DEFAULT 0,
            input_tokens INTEGER NOT NULL DEFAULT 0,
            output_tokens INTEGER NOT NULL DEFAULT 0,
            thinking_tokens INTEGER NOT NULL DEFAULT 0,
            total_cost_usd REAL NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_limit_events_unique
            ON limit_events(event_type, limit_type, timestamp_ms, message);
        CREATE INDEX IF NOT EXISTS idx_limit_events_ts ON limit_events(timestamp_ms);
        CREATE TABLE IF NOT EXISTS plan_config (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            plan_type TEXT NOT NULL,
            window_hours INTEGER NOT NULL,
            window_start_ms INTEGER,
            learned_token_limit REAL,
            learned_at_ms INTEGER,
            weekly_window_start_ms INTEGER,
            weekly_learned_token_limit REAL,
            weekly_learned_at_ms INTEGER,
            updated_at INTEGER
        );
        INSERT OR IGNORE INTO plan_config (id, plan_type, window_hours)
            VALUES (1, 'pro', {DEFAULT_WINDOW_HOURS});"
    ))
}

struct WindowColumns {
    start: &'static str,
    limit: &'static str,
    learned_at: &'static str,
}

fn window_columns(kind: WindowKind) -> WindowColumns {
    match kind {
        WindowKind::Short => WindowColumns {
            start: "window_start_ms",
            limit: "learned_token_limit",
            learned_at: "learned_at_ms",
        },
        WindowKind::Weekly => WindowColumns {
            start: "weekly_window_start_ms",
            limit: "weekly_learned_token_limit",
            learned_at: "weekly_learned_at_ms",
        },
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let count = |i: usize| row.get::<_, i64>(i).map(to_u64);
    let statistics = SessionStatistics {
        user_prompts: count(7)?,
        assistant_responses: count(8)?,
        tool_calls: count(9)?,
        errors_count: count(11)?,
        input_tokens: count(14)?,
        output_tokens: count(15)?,
        thinking_tokens: count(16)?,
        cache_read_tokens: count(17)?,
        cache_write_tokens: count(18)?,
        model: row.get(19)?,
        git_branch: row.get(20)?,
        tool_version: row.get(21)?,
        summary: row.get(22)?,
        start_time: from_ms(row.get(23)?),
        end_time: from_ms(row.get(24)?),
        ..Default::default()
    };
    Ok(SessionRecord {
        session_id: row.get(0)?,
        instance_id: row.get(1)?,
        hostname: row.get(2)?,
        transcript_path: row.get(3)?,
        cwd: row.get(4)?,
        exit_reason: row.get(5)?,
        permission_mode: row.get(6)?,
        statistics,
        cost_usd: row.get(25)?,
    })
}

/// Rows with an unknown event or limit type are skipped.
fn limit_event_from_row(row: &Row<'_>) -> rusqlite::Result<Option<StoredLimitEvent>> {
    let event_type: String = row.get(1)?;
    let limit_type: String = row.get(2)?;
    let (Some(event_type), Some(limit_type)) = (
        LimitEventType::parse(&event_type),
        LimitType::parse(&limit_type),
    ) else {
        return Ok(None);
    };
    let Some(timestamp) = from_ms(Some(row.get(3)?)) else {
        return Ok(None);
    };
    Ok(Some(StoredLimitEvent {
        id: row.get(0)?,
        event_type,
        limit_type,
        timestamp,
        message: row.get(4)?,
        tokens_used: to_u64(row.get(5)?),
        usage: UsageSummary {
            sessions_count: to_u64(row.get(6)?),
            input_tokens: to_u64(row.get(7)?),
            output_tokens: to_u64(row.get(8)?),
            thinking_tokens: to_u64(row.get(9)?),
            total_cost_usd: row.get(10)?,
        },
    }))
}

impl WindowStore for Database {
    fn plan_config(&self) -> Result<PlanConfig> {
        let config = self
            .conn
            .query_row(
                "SELECT plan_type, window_hours,
                        window_start_ms, learned_token_limit, learned_at_ms,
                        weekly_window_start_ms, weekly_learned_token_limit, weekly_learned_at_ms
                 FROM plan_config WHERE id = 1",
                [],
                |row| {
                    let plan: String = row.get(0)?;
                    let mut config = PlanConfig::new(
                        PlanType::parse(&plan).unwrap_or(PlanType::Custom),
                        row.get(1)?,
                    );
                    config.short = UsageWindow {
                        start_time: from_ms(row.get(2)?),
                        learned_token_limit: row.get(3)?,
                        learned_at: from_ms(row.get(4)?),
                    };
                    config.weekly = UsageWindow {
                        start_time: from_ms(row.get(5)?),
                        learned_token_limit: row.get(6)?,
                        learned_at: from_ms(row.get(7)?),
                    };
                    Ok(config)
                },
            )
            .context("Failed to read plan config")?;
        Ok(config)
    }

    fn swap_window_start(
        &self,
        kind: WindowKind,
        expected: Option<DateTime<Utc>>,
        new: DateTime<Utc>,
    ) -> Result<bool> {
        let col = window_columns(kind).start;
        let changed = self.conn.execute(
            &format!(
                "UPDATE plan_config SET {col} = ?1, updated_at = ?2 WHERE id = 1 AND {col} IS ?3"
            ),
            params![to_ms(new), to_ms(Utc::now()), expected.map(to_ms)],
        )?;
        Ok(changed == 1)
    }

    fn set_learned_limit(&self, kind: WindowKind, limit: f64, at: DateTime<Utc>) -> Result<()> {
        let cols = window_columns(kind);
        self.conn.execute(
            &format!(
                "UPDATE plan_config SET {} = ?1, {} = ?2, updated_at = ?3 WHERE id = 1",
                cols.limit, cols.learned_at
            ),
            params![limit, to_ms(at), to_ms(Utc::now())],
        )?;
        Ok(())
    }

    fn usage_since(&self, start: DateTime<Utc>) -> Result<UsageSummary> {
        self.usage_where("WHERE start_time_ms >= ?1", Some(to_ms(start)))
    }
}

impl LimitEventStore for Database {
    fn insert_limit_event(
        &self,
        event: &LimitEvent,
        at: DateTime<Utc>,
        usage: &UsageSummary,
    ) -> Result<Option<i64>> {
        let changed = self.conn.execute(
            "INSERT OR IGNORE INTO limit_events (
                event_type, limit_type, timestamp_ms, message, tokens_used,
                sessions_count, input_tokens, output_tokens, thinking_tokens,
                total_cost_usd, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                event.event_type.as_str(),
                event.limit_type.as_str(),
                to_ms(at),
                event.message,
                clamp_i64(event.tokens_used),
                clamp_i64(usage.sessions_count),
                clamp_i64(usage.input_tokens),
                clamp_i64(usage.output_tokens),
                clamp_i64(usage.thinking_tokens),
                usage.total_cost_usd,
                to_ms(Utc::now()),
            ],
        )?;
        Ok((changed == 1).then(|| self.conn.last_insert_rowid()))
    }

    fn last_limit_event_time(&self) -> Result<Option<DateTime<Utc>>> {
        let ms: Option<i64> =
            self.conn
                .query_row("SELECT MAX(timestamp_ms) FROM limit_events", [], |row| {
                    row.get(0)
                })?;
        Ok(from_ms(ms))
    }

    fn usage_since_last_limit(&self) -> Result<UsageSummary> {
        match self.last_limit_event_time()? {
            Some(t) => self.usage_where("WHERE start_time_ms > ?1", Some(to_ms(t))),
            None => self.usage_where("", None),
        }
    }

    fn limit_events_since(&self, since: DateTime<Utc>) -> Result<Vec<StoredLimitEvent>> {
        self.query_limit_events(
            "WHERE timestamp_ms >= ?1 ORDER BY timestamp_ms DESC, id DESC",
            params![to_ms(since)],
        )
    }

    fn limit_hits_by_type(
        &self,
        limit_type: LimitType,
        count: usize,
    ) -> Result<Vec<StoredLimitEvent>> {
        self.query_limit_events(
            "WHERE event_type = 'hit' AND limit_type = ?1
             ORDER BY timestamp_ms DESC, id DESC LIMIT ?2",
            params![limit_type.as_str(), i64::try_from(count).unwrap_or(i64::MAX)],
        )
    }
}
