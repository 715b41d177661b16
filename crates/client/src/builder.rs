//! Fluent builder for [`GatewayClient`].

use std::time::Duration;

use cl_protocol::HelloOk;

use crate::client::GatewayClient;
use crate::error::GatewayError;
use crate::reconnect::RetryPolicy;
use crate::state::ConnectionState;

/// Observer invoked on every connection state transition.
pub type StateCallback = Box<dyn Fn(ConnectionState) + Send + Sync>;
/// Observer invoked each time a handshake completes.
pub type HelloCallback = Box<dyn Fn(&HelloOk) + Send + Sync>;
/// Observer invoked when a connection-level error occurs.
pub type ErrorCallback = Box<dyn Fn(&GatewayError) + Send + Sync>;

/// Fluent builder for [`GatewayClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use cl_client::GatewayClient;
/// let client = GatewayClient::builder()
///     .url("wss://gw.example.com")
///     .token("secret")
///     .rpc_timeout(std::time::Duration::from_secs(15))
///     .on_state_change(|state| eprintln!("gateway: {state}"))
///     .build();
/// ```
pub struct GatewayClientBuilder {
    pub(crate) url: String,
    pub(crate) token: Option<String>,
    pub(crate) rpc_timeout: Duration,
    pub(crate) handshake_timeout: Duration,
    pub(crate) retry: RetryPolicy,
    pub(crate) on_state_change: Option<StateCallback>,
    pub(crate) on_hello: Option<HelloCallback>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl GatewayClientBuilder {
    pub fn new() -> Self {
        Self {
            url: "ws://127.0.0.1:18789".into(),
            token: None,
            rpc_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            on_state_change: None,
            on_hello: None,
            on_error: None,
        }
    }

    /// Gateway WebSocket URL (e.g. `ws://localhost:18789`).
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Bearer token sent in the `hello` frame.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Deadline for each rpc call (default 30s).
    pub fn rpc_timeout(mut self, d: Duration) -> Self {
        self.rpc_timeout = d;
        self
    }

    /// Deadline for the `hello`/`hello-ok` exchange (default 10s).
    pub fn handshake_timeout(mut self, d: Duration) -> Self {
        self.handshake_timeout = d;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Observe every state transition.
    pub fn on_state_change(
        mut self,
        f: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        self.on_state_change = Some(Box::new(f));
        self
    }

    /// Observe each completed handshake's `hello-ok`.
    pub fn on_hello(mut self, f: impl Fn(&HelloOk) + Send + Sync + 'static) -> Self {
        self.on_hello = Some(Box::new(f));
        self
    }

    /// Observe connection-level errors (transport faults, auth
    /// rejection). Per-call rpc errors are returned to the caller, not
    /// reported here.
    pub fn on_error(mut self, f: impl Fn(&GatewayError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Build the client. A bad URL surfaces as a `Transport` error at
    /// connect time, not here.
    pub fn build(self) -> GatewayClient {
        GatewayClient::from_builder(self)
    }
}

impl Default for GatewayClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
