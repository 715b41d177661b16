//! Payloads for the streaming chat protocol (`chat.*` RPCs and the
//! `chat` event).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle state of one streamed assistant turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatEventState {
    /// Full-replacement snapshot of the run's accumulated text so far —
    /// not an increment.
    Delta,
    /// The run completed; the message may carry the complete final text.
    Final,
    /// The run was cancelled before completion.
    Aborted,
    /// The run failed; `error_message` carries the reason.
    Error,
}

/// One `chat` event payload.
///
/// The gateway echoes the fully-qualified session key (it namespaces the
/// key the client sent, e.g. `agent:<agentId>:<key>`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatEvent {
    #[serde(default)]
    pub session_key: String,
    #[serde(default)]
    pub run_id: String,
    pub state: ChatEventState,
    #[serde(default)]
    pub message: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Params for `chat.send`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatSendParams {
    pub session_key: String,
    pub message: String,
    /// Fresh per send; lets the gateway drop duplicate deliveries.
    pub idempotency_key: String,
}

/// Params for `chat.abort`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatAbortParams {
    pub session_key: String,
    pub run_id: String,
}

/// Params for `chat.history`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryParams {
    pub session_key: String,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_event_parses_wire_shape() {
        let raw = r#"{
            "sessionKey": "agent:main:hn-dashboard-chat",
            "runId": "run-42",
            "state": "delta",
            "message": { "content": [{ "type": "text", "text": "Hel" }] }
        }"#;
        let event: ChatEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.session_key, "agent:main:hn-dashboard-chat");
        assert_eq!(event.run_id, "run-42");
        assert_eq!(event.state, ChatEventState::Delta);
        assert!(event.error_message.is_none());
    }

    #[test]
    fn chat_event_error_state() {
        let raw = r#"{
            "sessionKey": "agent:main:k",
            "runId": "r1",
            "state": "error",
            "message": "",
            "errorMessage": "provider quota exhausted"
        }"#;
        let event: ChatEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.state, ChatEventState::Error);
        assert_eq!(
            event.error_message.as_deref(),
            Some("provider quota exhausted")
        );
    }

    #[test]
    fn send_params_use_camel_case() {
        let params = ChatSendParams {
            session_key: "k".into(),
            message: "hi".into(),
            idempotency_key: "idem-1".into(),
        };
        let json = serde_json::to_string(&params).unwrap();
        assert!(json.contains("\"sessionKey\":\"k\""));
        assert!(json.contains("\"idempotencyKey\":\"idem-1\""));
    }

    #[test]
    fn state_names_match_wire() {
        for (state, wire) in [
            (ChatEventState::Delta, "\"delta\""),
            (ChatEventState::Final, "\"final\""),
            (ChatEventState::Aborted, "\"aborted\""),
            (ChatEventState::Error, "\"error\""),
        ] {
            assert_eq!(serde_json::to_string(&state).unwrap(), wire);
        }
    }
}
