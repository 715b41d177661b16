//! `cl-client` — persistent client for an OpenClaw-compatible gateway.
//!
//! One WebSocket carries everything: an authenticated `hello` handshake,
//! concurrently multiplexed rpc calls correlated by id, and unsolicited
//! server-pushed events fanned out to subscribers. The client reconnects
//! on transport failures with jittered exponential backoff; an explicit
//! [`disconnect`](GatewayClient::disconnect) is terminal until the next
//! [`connect`](GatewayClient::connect).
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::time::Duration;
//! # async fn demo() -> Result<(), cl_client::GatewayError> {
//! let client = cl_client::GatewayClient::builder()
//!     .url("ws://localhost:18789")
//!     .token("secret")
//!     .build();
//! client.connect();
//! client.wait_until_connected(Duration::from_secs(5)).await?;
//!
//! let health = client.rpc("health", serde_json::json!({})).await?;
//! println!("health: {health}");
//!
//! let sub = client.on("cron", |payload| tracing::info!(%payload, "cron event"));
//! // ...
//! sub.unsubscribe();
//! client.disconnect();
//! # Ok(()) }
//! ```

pub mod builder;
pub mod client;
pub mod error;
pub mod events;
pub mod reconnect;
pub mod state;

mod correlation;
mod transport;

pub use builder::GatewayClientBuilder;
pub use client::GatewayClient;
pub use error::GatewayError;
pub use events::Subscription;
pub use reconnect::RetryPolicy;
pub use state::ConnectionState;

// Re-export the wire types so consumers rarely need cl-protocol
// directly.
pub use cl_protocol::{Frame, HelloOk, Presence, ServerInfo, Snapshot};
