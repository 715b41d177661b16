//! Frame envelope and handshake payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One discrete wire message.
///
/// Serialized as a JSON object whose `type` field selects the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    /// Client → Gateway: authentication handshake. Sent once, before any
    /// RPC. The token field is omitted entirely when unauthenticated.
    Hello {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Gateway → Client: handshake accepted.
    HelloOk {
        server: ServerInfo,
        #[serde(default)]
        snapshot: Snapshot,
    },

    /// Client → Gateway: one correlated request.
    Rpc {
        id: u64,
        method: String,
        #[serde(default)]
        params: Value,
    },

    /// Gateway → Client: successful response for `id`.
    RpcResult {
        id: u64,
        #[serde(default)]
        result: Value,
    },

    /// Gateway → Client: failed response for `id`.
    RpcError { id: u64, error: RpcErrorPayload },

    /// Gateway → Client: unsolicited push, fanned out to every subscriber
    /// of `event`.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

/// Gateway build information reported in `hello-ok`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerInfo {
    #[serde(default)]
    pub version: String,
}

/// Point-in-time gateway state included in `hello-ok`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub uptime_ms: u64,
    #[serde(default)]
    pub presence: Vec<Presence>,
}

/// One presence entry in the hello snapshot. The gateway owns the exact
/// shape; fields we don't model are preserved in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Presence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// The handshake result a client holds on to for the life of a
/// connection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HelloOk {
    pub server: ServerInfo,
    pub snapshot: Snapshot,
}

/// Error payload carried by an `rpc-error` frame.
///
/// `code` stays an opaque JSON value: gateways emit both string and
/// numeric codes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RpcErrorPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<Value>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Failure to decode an inbound text message into a [`Frame`].
///
/// Covers both unparseable JSON and well-formed JSON with an unknown or
/// missing `type` tag.
#[derive(Debug, thiserror::Error)]
#[error("malformed frame: {0}")]
pub struct FrameError(#[from] serde_json::Error);

/// Serialize a frame to its wire form.
pub fn encode_frame(frame: &Frame) -> Result<String, serde_json::Error> {
    serde_json::to_string(frame)
}

/// Parse one inbound text message.
pub fn decode_frame(text: &str) -> Result<Frame, FrameError> {
    Ok(serde_json::from_str(text)?)
}
