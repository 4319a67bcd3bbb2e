//! # Transcript Module
//!
//! Single-pass parser for JSONL session transcripts.
//!
//! Every decodable line updates the session's timestamps and metadata, then is
//! dispatched on its `type`:
//! - `user` / `human`: prompt count and the session summary
//! - `assistant`: response count, token usage, model, embedded tool calls
//! - `tool_use`: legacy top-level tool calls
//! - `tool_result`: error counting
//! - `system`: quota notices, see [`crate::limits`]
//!
//! Lines that do not decode are skipped. Only I/O failures are reported.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use thiserror::Error;

use crate::limits;
use crate::models::{LimitEvent, ParsedTranscript, SessionStatistics, TranscriptLine};

const SUMMARY_MAX_CHARS: usize = 200;
const ERROR_SCAN_CHARS: usize = 100;

const FILE_TOOLS: &[&str] = &["Read", "Edit", "Write", "Glob", "Grep", "LSP", "NotebookEdit"];
const MODIFYING_TOOLS: &[&str] = &["Edit", "Write", "NotebookEdit"];
const PATH_KEYS: &[&str] = &["file_path", "path", "notebook_path"];

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("failed to read transcript {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Parse the transcript at `path`. An empty path or a missing file yields an
/// empty result.
pub fn parse_path(path: &str) -> Result<ParsedTranscript, TranscriptError> {
    if path.is_empty() {
        return Ok(ParsedTranscript::default());
    }
    let file = match File::open(Path::new(path)) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path, "transcript not found");
            return Ok(ParsedTranscript::default());
        }
        Err(source) => {
            return Err(TranscriptError::Io {
                path: path.to_string(),
                source,
            });
        }
    };
    parse_reader(file).map_err(|e| match e {
        TranscriptError::Io { source, .. } => TranscriptError::Io {
            path: path.to_string(),
            source,
        },
    })
}

/// Parse a transcript from any byte stream.
pub fn parse_reader<R: Read>(reader: R) -> Result<ParsedTranscript, TranscriptError> {
    let mut reader = BufReader::new(reader);
    let mut aggregator = Aggregator::default();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|source| TranscriptError::Io {
                path: String::from("<reader>"),
                source,
            })?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some(entry) = TranscriptLine::decode(&line) {
            aggregator.process(&entry);
        }
    }
    Ok(aggregator.finish())
}

/// Running state of one parse pass.
#[derive(Default)]
struct Aggregator {
    stats: SessionStatistics,
    limit_events: Vec<LimitEvent>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Aggregator {
    fn process(&mut self, entry: &TranscriptLine) {
        let ts = entry.parsed_timestamp();
        self.update_timestamps(ts);
        self.update_metadata(entry);

        match entry.kind.as_str() {
            "user" | "human" => self.on_user(entry),
            "assistant" => self.on_assistant(entry),
            "tool_use" => self.record_tool_call(entry.name.as_deref().unwrap_or_default()),
            "tool_result" => self.on_tool_result(entry),
            "system" => self.on_system(entry, ts),
            _ => {}
        }

        if ts.is_some() {
            self.last_timestamp = ts;
        }
    }

    fn finish(self) -> ParsedTranscript {
        ParsedTranscript {
            statistics: self.stats,
            limit_events: self.limit_events,
        }
    }

    fn update_timestamps(&mut self, ts: Option<DateTime<Utc>>) {
        let Some(ts) = ts else { return };
        if self.stats.start_time.is_none() {
            self.stats.start_time = Some(ts);
        }
        self.stats.end_time = Some(ts);
    }

    fn update_metadata(&mut self, entry: &TranscriptLine) {
        if self.stats.git_branch.is_empty()
            && let Some(branch) = entry.git_branch.as_deref().filter(|b| !b.is_empty())
        {
            self.stats.git_branch = branch.to_string();
        }
        if self.stats.tool_version.is_empty()
            && let Some(version) = entry.version.as_deref().filter(|v| !v.is_empty())
        {
            self.stats.tool_version = version.to_string();
        }
    }

    fn on_user(&mut self, entry: &TranscriptLine) {
        self.stats.user_prompts += 1;
        if !self.stats.summary.is_empty() {
            return;
        }
        let text = entry.message().map(|m| m.content.text()).unwrap_or_default();
        if !text.is_empty() {
            self.stats.summary = text.chars().take(SUMMARY_MAX_CHARS).collect();
        }
    }

    fn on_assistant(&mut self, entry: &TranscriptLine) {
        self.stats.assistant_responses += 1;
        let Some(msg) = entry.message() else { return };

        let usage = &msg.usage;
        let stats = &mut self.stats;
        stats.input_tokens = stats.input_tokens.saturating_add(usage.input_tokens);
        stats.output_tokens = stats.output_tokens.saturating_add(usage.output_tokens);
        stats.cache_read_tokens = stats
            .cache_read_tokens
            .saturating_add(usage.cache_read_input_tokens);
        stats.cache_write_tokens = stats
            .cache_write_tokens
            .saturating_add(usage.cache_creation_input_tokens);
        stats.thinking_tokens = stats.thinking_tokens.saturating_add(usage.thinking_tokens);

        if self.stats.model.is_empty() {
            let model = msg
                .model
                .as_deref()
                .filter(|m| !m.is_empty())
                .or(entry.model.as_deref())
                .unwrap_or_default();
            self.stats.model = model.to_string();
        }

        for (name, input) in msg.content.tool_uses() {
            self.record_tool_call(name);
            self.record_file_access(name, input);
        }
    }

    fn record_tool_call(&mut self, name: &str) {
        let name = if name.is_empty() { "unknown" } else { name };
        self.stats.tool_calls += 1;
        *self
            .stats
            .tools_breakdown
            .entry(name.to_string())
            .or_default() += 1;
    }

    fn record_file_access(&mut self, tool: &str, input: &Value) {
        if !FILE_TOOLS.contains(&tool) {
            return;
        }
        let Some(path) = PATH_KEYS
            .iter()
            .filter_map(|k| input.get(*k).and_then(Value::as_str))
            .find(|p| !p.is_empty())
        else {
            return;
        };
        self.stats.files_accessed.insert(path.to_string());
        if MODIFYING_TOOLS.contains(&tool) {
            self.stats.files_modified.insert(path.to_string());
        }
    }

    fn on_tool_result(&mut self, entry: &TranscriptLine) {
        if entry.is_error {
            self.stats.errors_count += 1;
            return;
        }
        // Heuristic: tool output that merely mentions "error" early on counts
        // as a failure. False positives are accepted.
        let head: String = entry
            .content
            .text()
            .chars()
            .take(ERROR_SCAN_CHARS)
            .collect();
        if head.to_lowercase().contains("error") {
            self.stats.errors_count += 1;
        }
    }

    fn on_system(&mut self, entry: &TranscriptLine, ts: Option<DateTime<Utc>>) {
        let text = entry.body_text();
        let Some(signal) = limits::classify(&text) else {
            return;
        };
        tracing::debug!(
            event = signal.event_type.as_str(),
            period = signal.limit_type.as_str(),
            tokens = signal.tokens_used,
            "quota notice in transcript"
        );
        self.limit_events.push(LimitEvent {
            event_type: signal.event_type,
            limit_type: signal.limit_type,
            timestamp: ts.or(self.last_timestamp),
            message: text,
            tokens_used: signal.tokens_used,
        });
    }
}
