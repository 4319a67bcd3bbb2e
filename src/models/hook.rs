use serde::Deserialize;

/// Payload the assistant sends to a session-end hook on stdin.
#[derive(Deserialize, Debug, Clone)]
pub struct SessionEndHook {
    pub session_id: String,
    #[serde(default)]
    pub transcript_path: String,
    pub cwd: Option<String>,
    /// Why the session ended (clear, logout, prompt_input_exit, other)
    pub reason: Option<String>,
    pub permission_mode: Option<String>,
    pub hook_event_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_payload() {
        let hook: SessionEndHook = serde_json::from_str(
            r#"{"session_id":"abc","transcript_path":"/tmp/t.jsonl","hook_event_name":"SessionEnd","reason":"exit"}"#,
        )
        .unwrap();
        assert_eq!(hook.session_id, "abc");
        assert_eq!(hook.reason.as_deref(), Some("exit"));
        assert!(hook.cwd.is_none());
    }
}
