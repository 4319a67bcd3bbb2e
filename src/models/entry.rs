use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::models::message::{Content, MessageObj, null_as_default};

/// One decoded transcript line.
///
/// Only the keys the aggregator reads are modelled; everything else is ignored.
/// `message` stays raw until a handler asks for it, so a line whose message has
/// an unexpected shape still counts toward its type.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(default)]
pub struct TranscriptLine {
    #[serde(rename = "type", deserialize_with = "null_as_default")]
    pub kind: String,
    pub timestamp: Option<String>,
    #[serde(rename = "gitBranch")]
    pub git_branch: Option<String>,
    pub version: Option<String>,
    pub model: Option<String>,
    pub message: Option<Value>,
    pub name: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_error: bool,
    pub content: Content,
}

impl TranscriptLine {
    /// Decode one line. Blank or malformed lines yield `None`.
    pub fn decode(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<TranscriptLine>(trimmed) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "skipping undecodable transcript line");
                None
            }
        }
    }

    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        let ts = self.timestamp.as_deref()?;
        DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    pub fn message(&self) -> Option<MessageObj> {
        self.message.as_ref().and_then(MessageObj::from_value)
    }

    /// Text of a `system` or `tool_result` line. The top-level `content` is
    /// preferred; older clients nest it under `message.content`.
    pub fn body_text(&self) -> String {
        if !self.content.is_empty() {
            return self.content.text();
        }
        self.message()
            .map(|m| m.content.text())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_realistic_user_line() {
        let line = r#"{"parentUuid":null,"isSidechain":false,"userType":"external","cwd":"/Users/test/project","sessionId":"abc-123","version":"2.0.76","gitBranch":"main","type":"user","message":{"role":"user","content":"Fix the authentication bug"},"uuid":"msg-001","timestamp":"2025-01-15T10:00:00Z"}"#;
        let entry = TranscriptLine::decode(line).unwrap();
        assert_eq!(entry.kind, "user");
        assert_eq!(entry.git_branch.as_deref(), Some("main"));
        assert_eq!(entry.version.as_deref(), Some("2.0.76"));
        assert!(entry.parsed_timestamp().is_some());
        assert_eq!(
            entry.message().unwrap().content.text(),
            "Fix the authentication bug"
        );
    }

    #[test]
    fn blank_and_malformed_lines_are_skipped() {
        assert!(TranscriptLine::decode("").is_none());
        assert!(TranscriptLine::decode("   \t").is_none());
        assert!(TranscriptLine::decode("{not json").is_none());
        assert!(TranscriptLine::decode("[1,2,3]").is_none());
    }

    #[test]
    fn bad_timestamp_is_absent_not_fatal() {
        let entry = TranscriptLine::decode(r#"{"type":"user","timestamp":"yesterday"}"#).unwrap();
        assert!(entry.parsed_timestamp().is_none());
    }

    #[test]
    fn body_text_falls_back_to_message_content() {
        let top = TranscriptLine::decode(r#"{"type":"system","content":"Rate limit hit"}"#).unwrap();
        assert_eq!(top.body_text(), "Rate limit hit");

        let nested = TranscriptLine::decode(
            r#"{"type":"system","message":{"content":[{"type":"text","text":"Quota exceeded"}]}}"#,
        )
        .unwrap();
        assert_eq!(nested.body_text(), "Quota exceeded");
    }

    #[test]
    fn null_flags_keep_the_line() {
        let entry = TranscriptLine::decode(
            r#"{"type":"tool_result","is_error":null,"timestamp":"2025-01-15T10:00:00Z","gitBranch":"main","content":"Error: boom"}"#,
        )
        .unwrap();
        assert!(!entry.is_error);
        assert_eq!(entry.git_branch.as_deref(), Some("main"));
        assert!(entry.parsed_timestamp().is_some());

        let entry = TranscriptLine::decode(r#"{"type":null,"timestamp":"2025-01-15T10:00:00Z"}"#)
            .unwrap();
        assert_eq!(entry.kind, "");
    }

    #[test]
    fn snapshot_lines_decode_with_their_type() {
        let entry = TranscriptLine::decode(
            r#"{"type":"file-history-snapshot","messageId":"msg-001","snapshot":{"trackedFileBackups":{}},"isSnapshotUpdate":false}"#,
        )
        .unwrap();
        assert_eq!(entry.kind, "file-history-snapshot");
        assert!(entry.message().is_none());
    }
}
