//! `cl-chat` — streaming chat protocol on top of the gateway client.
//!
//! A [`ChatSession`] binds one fully-qualified session key to a
//! [`GatewayClient`](cl_client::GatewayClient), reconstructing per-turn
//! assistant messages from the gateway's `chat` event stream: deltas are
//! full-replacement snapshots, `final` seals a turn, `aborted`/`error`
//! mark it without losing content. Sending, aborting, and history all go
//! through plain rpc calls — the session adds no transport of its own.

pub mod extract;
pub mod message;
pub mod session;

pub use extract::extract_text;
pub use message::{ChatMessage, MessageRole};
pub use session::{ChatSession, DEFAULT_HISTORY_LIMIT};

// The message state enum is shared with the wire protocol.
pub use cl_protocol::ChatEventState;
