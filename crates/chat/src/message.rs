//! Local chat message model.

use serde::{Deserialize, Serialize};

use cl_protocol::ChatEventState;

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One entry in the local conversation view.
///
/// The assistant side holds at most one message per `run_id`; each delta
/// replaces its content wholesale. User messages carry no state or run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ChatEventState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

impl ChatMessage {
    pub(crate) fn user(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::User,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            state: None,
            run_id: None,
        }
    }

    pub(crate) fn assistant(run_id: &str, content: String, state: ChatEventState) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: MessageRole::Assistant,
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
            state: Some(state),
            run_id: Some(run_id.to_string()),
        }
    }
}
