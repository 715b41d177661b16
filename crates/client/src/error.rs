//! Client-side error taxonomy.

use std::time::Duration;

use serde_json::Value;

use cl_protocol::RpcErrorPayload;

/// Everything that can go wrong between a caller and the gateway.
///
/// `Transport` and `Timeout` feed the reconnect policy; `Auth` is
/// terminal for the connection; `Remote` belongs to a single rpc call
/// and never affects connection state.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Socket-level failure: dial, read, write, or abnormal close.
    #[error("transport: {0}")]
    Transport(String),

    /// The gateway refused the hello handshake. The client settles in
    /// `disconnected` and does not retry on its own.
    #[error("auth: {0}")]
    Auth(String),

    /// An rpc call exceeded its deadline.
    #[error("timeout: {method} got no response within {after:?}")]
    Timeout { method: String, after: Duration },

    /// An rpc was attempted while the client was not connected. Nothing
    /// was sent.
    #[error("not connected to gateway")]
    NotConnected,

    /// The gateway answered an rpc with an `rpc-error` frame.
    #[error("remote: {message}")]
    Remote {
        code: Option<Value>,
        message: String,
    },

    /// An unparseable or out-of-contract frame.
    #[error("protocol: {0}")]
    Protocol(String),

    /// The client was torn down while the call was still pending.
    #[error("disconnected")]
    Disconnected,
}

impl From<RpcErrorPayload> for GatewayError {
    fn from(payload: RpcErrorPayload) -> Self {
        GatewayError::Remote {
            code: payload.code,
            message: payload.message,
        }
    }
}
