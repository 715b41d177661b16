//! `cl-protocol` — wire types for the ClawLink gateway protocol.
//!
//! The gateway speaks a message-oriented duplex protocol: JSON text
//! frames over one WebSocket, discriminated by a `type` tag. Each
//! connection opens with a `hello`/`hello-ok` handshake, after which the
//! channel multiplexes correlated RPC exchanges (`rpc` → `rpc-result` |
//! `rpc-error`) and unsolicited server-pushed `event` frames.

pub mod chat;
pub mod frame;
pub mod methods;

pub use chat::{
    ChatAbortParams, ChatEvent, ChatEventState, ChatHistoryParams, ChatSendParams,
};
pub use frame::{
    decode_frame, encode_frame, Frame, FrameError, HelloOk, Presence, RpcErrorPayload,
    ServerInfo, Snapshot,
};
