//! Gateway client facade and connection driver.
//!
//! One driver task owns the connection lifecycle: dial → `hello` →
//! `hello-ok` → pump frames → reconnect with backoff. The facade methods
//! (`rpc`, `on`, `connect`, `disconnect`) are safe to call from any task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cl_protocol::{Frame, HelloOk};

use crate::builder::{ErrorCallback, GatewayClientBuilder, HelloCallback, StateCallback};
use crate::correlation::CorrelationTable;
use crate::error::GatewayError;
use crate::events::{EventRegistry, Subscription};
use crate::reconnect::RetryPolicy;
use crate::state::ConnectionState;
use crate::transport::{RecvError, Transport, TransportReader};

/// Handle to one gateway connection.
///
/// Cheap to clone; every clone shares the same connection, correlation
/// table, and subscriptions. Constructed via [`GatewayClient::builder`]
/// and passed to consumers explicitly — there is no global instance.
#[derive(Clone)]
pub struct GatewayClient {
    inner: Arc<ClientInner>,
}

struct DriverHandle {
    generation: u64,
    shutdown: CancellationToken,
}

pub(crate) struct ClientInner {
    url: String,
    token: Option<String>,
    rpc_timeout: Duration,
    handshake_timeout: Duration,
    retry: RetryPolicy,

    state_tx: watch::Sender<ConnectionState>,
    hello: Mutex<Option<HelloOk>>,
    correlation: CorrelationTable,
    events: EventRegistry,
    /// Sender into the live connection's writer task; `None` while
    /// disconnected.
    outbound: Mutex<Option<mpsc::Sender<Frame>>>,

    /// The currently registered driver, if any.
    driver: Mutex<Option<DriverHandle>>,
    driver_generation: AtomicU64,
    /// Previous driver task, awaited by the next one so connection
    /// attempts never overlap.
    last_driver_task: Mutex<Option<JoinHandle<()>>>,

    on_state_change: Option<StateCallback>,
    on_hello: Option<HelloCallback>,
    on_error: Option<ErrorCallback>,
}

impl GatewayClient {
    /// Start building a client.
    pub fn builder() -> GatewayClientBuilder {
        GatewayClientBuilder::new()
    }

    pub(crate) fn from_builder(b: GatewayClientBuilder) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                url: b.url,
                token: b.token,
                rpc_timeout: b.rpc_timeout,
                handshake_timeout: b.handshake_timeout,
                retry: b.retry,
                state_tx,
                hello: Mutex::new(None),
                correlation: CorrelationTable::new(),
                events: EventRegistry::new(),
                outbound: Mutex::new(None),
                driver: Mutex::new(None),
                driver_generation: AtomicU64::new(0),
                last_driver_task: Mutex::new(None),
                on_state_change: b.on_state_change,
                on_hello: b.on_hello,
                on_error: b.on_error,
            }),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state_tx.borrow()
    }

    /// Watch every state transition. The receiver observes the current
    /// state immediately.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// The `hello-ok` payload of the live handshake, if connected.
    pub fn hello(&self) -> Option<HelloOk> {
        self.inner.hello.lock().clone()
    }

    /// Number of rpc calls still awaiting a response.
    pub fn pending_rpcs(&self) -> usize {
        self.inner.correlation.len()
    }

    /// Start connecting. A no-op while a connection is live or being
    /// established. Must be called from within a Tokio runtime.
    ///
    /// Reconnect attempts are serialized: one driver task owns the whole
    /// lifecycle, and a new driver never dials before its predecessor has
    /// fully wound down.
    pub fn connect(&self) {
        let (generation, shutdown) = {
            let mut driver = self.inner.driver.lock();
            if let Some(handle) = driver.as_ref() {
                if !handle.shutdown.is_cancelled() {
                    tracing::debug!("connect ignored: already connecting or connected");
                    return;
                }
            }
            let generation = self.inner.driver_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let shutdown = CancellationToken::new();
            *driver = Some(DriverHandle {
                generation,
                shutdown: shutdown.clone(),
            });
            (generation, shutdown)
        };

        let previous = self.inner.last_driver_task.lock().take();
        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            if let Some(prev) = previous {
                let _ = prev.await;
            }
            run_driver(inner, generation, shutdown).await;
        });
        *self.inner.last_driver_task.lock() = Some(task);
    }

    /// Tear the connection down from any state: cancels the driver and
    /// its timers, closes the transport, rejects every pending rpc with
    /// [`GatewayError::Disconnected`], and settles in `Disconnected`
    /// until the next [`connect`](Self::connect).
    ///
    /// Event subscriptions are kept; events simply stop arriving.
    pub fn disconnect(&self) {
        let changed = {
            let mut driver = self.inner.driver.lock();
            if let Some(handle) = driver.take() {
                handle.shutdown.cancel();
            }
            self.inner.commit_state(ConnectionState::Disconnected)
        };
        self.inner.outbound.lock().take();
        self.inner.correlation.fail_all(|| GatewayError::Disconnected);
        self.inner.hello.lock().take();
        if changed {
            self.inner.notify_state(ConnectionState::Disconnected);
        }
    }

    /// One correlated request/response exchange.
    ///
    /// Rejects immediately with [`GatewayError::NotConnected`] — sending
    /// nothing — unless the state is `Connected`. Concurrent calls are
    /// tracked independently by id; responses may arrive in any order.
    pub async fn rpc(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        if self.state() != ConnectionState::Connected {
            return Err(GatewayError::NotConnected);
        }
        let Some(sender) = self.inner.outbound.lock().clone() else {
            return Err(GatewayError::NotConnected);
        };

        let (id, rx) = self.inner.correlation.register(method);
        let frame = Frame::Rpc {
            id,
            method: method.to_string(),
            params,
        };
        if sender.send(frame).await.is_err() {
            self.inner.correlation.forget(id);
            return Err(GatewayError::NotConnected);
        }

        match tokio::time::timeout(self.inner.rpc_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            // Slot dropped without settling; the table was torn down.
            Ok(Err(_)) => Err(GatewayError::Disconnected),
            Err(_) => {
                if self.inner.correlation.forget(id) {
                    tracing::warn!(id, method, "rpc timed out; a late response will be dropped");
                }
                Err(GatewayError::Timeout {
                    method: method.to_string(),
                    after: self.inner.rpc_timeout,
                })
            }
        }
    }

    /// Register `callback` for every future `event` frame named `event`.
    ///
    /// Works in any connection state; subscriptions persist across
    /// reconnects. Callbacks run on the connection's reader task and
    /// should return quickly.
    pub fn on(
        &self,
        event: &str,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(event, Box::new(callback))
    }

    /// Wait until the client reaches `Connected`. Fails with
    /// [`GatewayError::Disconnected`] if the client gives up first
    /// (auth rejection, retry exhaustion, explicit disconnect), or with
    /// a timeout after `timeout`.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), GatewayError> {
        let mut rx = self.state_changes();
        let mut seen_activity = false;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            match *rx.borrow_and_update() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected if seen_activity => {
                    return Err(GatewayError::Disconnected);
                }
                ConnectionState::Disconnected => {}
                _ => seen_activity = true,
            }
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        return Err(GatewayError::Disconnected);
                    }
                }
                _ = &mut deadline => {
                    return Err(GatewayError::Timeout {
                        method: "connect".into(),
                        after: timeout,
                    });
                }
            }
        }
    }
}

impl ClientInner {
    /// Record a state change. Returns whether anything changed; the
    /// caller invokes [`notify_state`](Self::notify_state) outside any
    /// lock.
    fn commit_state(&self, next: ConnectionState) -> bool {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            tracing::debug!(state = %next, "connection state changed");
        }
        changed
    }

    fn notify_state(&self, state: ConnectionState) {
        if let Some(cb) = &self.on_state_change {
            cb(state);
        }
    }

    fn report_error(&self, err: &GatewayError) {
        if let Some(cb) = &self.on_error {
            cb(err);
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connection driver
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// State writes race an explicit `disconnect()`; they only land while
/// this driver is still the registered one and not cancelled.
fn set_state_from_driver(inner: &Arc<ClientInner>, generation: u64, next: ConnectionState) {
    let changed = {
        let driver = inner.driver.lock();
        let ours = driver
            .as_ref()
            .is_some_and(|h| h.generation == generation && !h.shutdown.is_cancelled());
        ours && inner.commit_state(next)
    };
    if changed {
        inner.notify_state(next);
    }
}

/// Publish the completed handshake: install the outbound sender, store
/// the hello snapshot, and move to `Connected`. Returns `false` if this
/// driver was superseded mid-handshake.
fn enter_connected(
    inner: &Arc<ClientInner>,
    generation: u64,
    hello: HelloOk,
    outbound: mpsc::Sender<Frame>,
) -> bool {
    let changed = {
        let driver = inner.driver.lock();
        let ours = driver
            .as_ref()
            .is_some_and(|h| h.generation == generation && !h.shutdown.is_cancelled());
        if !ours {
            return false;
        }
        *inner.outbound.lock() = Some(outbound);
        *inner.hello.lock() = Some(hello.clone());
        inner.commit_state(ConnectionState::Connected)
    };
    if changed {
        inner.notify_state(ConnectionState::Connected);
    }
    if let Some(cb) = &inner.on_hello {
        cb(&hello);
    }
    true
}

/// Deregister this driver and settle in `Disconnected` (auth rejection
/// or retry exhaustion). No-op if `disconnect()` got there first.
fn settle_disconnected(inner: &Arc<ClientInner>, generation: u64) {
    let changed = {
        let mut driver = inner.driver.lock();
        let ours = driver
            .as_ref()
            .is_some_and(|h| h.generation == generation);
        if !ours {
            return;
        }
        *driver = None;
        inner.commit_state(ConnectionState::Disconnected)
    };
    if changed {
        inner.notify_state(ConnectionState::Disconnected);
    }
}

/// Connection driver: one task per `connect()`, serializing every
/// reconnect attempt. Exits on shutdown, on auth rejection, or when the
/// retry policy gives up.
async fn run_driver(inner: Arc<ClientInner>, generation: u64, shutdown: CancellationToken) {
    let mut attempt: u32 = 0;
    loop {
        if shutdown.is_cancelled() {
            return;
        }

        let outcome = tokio::select! {
            r = run_connection(&inner, generation) => r,
            _ = shutdown.cancelled() => return,
        };

        if shutdown.is_cancelled() {
            // disconnect() already settled state and rejected pendings.
            return;
        }

        match outcome {
            Ok(true) => {
                // A live session ended with a remote close. Retry from a
                // fresh backoff.
                attempt = 0;
                let err = GatewayError::Transport("connection closed by gateway".into());
                inner.report_error(&err);
                set_state_from_driver(&inner, generation, ConnectionState::Error);
            }
            Ok(false) => return, // superseded mid-handshake
            Err(err @ GatewayError::Auth(_)) => {
                // Hello rejected: terminal until the caller reconnects,
                // presumably with a corrected token.
                tracing::warn!(error = %err, "handshake rejected");
                inner.report_error(&err);
                settle_disconnected(&inner, generation);
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, attempt, "connection attempt failed");
                inner.report_error(&err);
                set_state_from_driver(&inner, generation, ConnectionState::Error);
            }
        }

        if inner.retry.give_up(attempt) {
            tracing::warn!(attempts = attempt, "reconnect attempts exhausted, giving up");
            settle_disconnected(&inner, generation);
            return;
        }

        let delay = inner.retry.delay(attempt);
        tracing::info!(
            delay_ms = delay.as_millis() as u64,
            attempt = attempt + 1,
            "scheduling reconnect"
        );
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.cancelled() => return,
        }
        attempt += 1;
    }
}

/// Single connection lifecycle: dial → handshake → pump frames.
///
/// `Ok(true)` means a live session ran and ended with a remote close;
/// `Ok(false)` means this driver was superseded before going live.
async fn run_connection(
    inner: &Arc<ClientInner>,
    generation: u64,
) -> Result<bool, GatewayError> {
    set_state_from_driver(inner, generation, ConnectionState::Connecting);
    tracing::info!(url = %inner.url, "connecting to gateway");
    let mut transport = Transport::open(&inner.url).await?;

    // ── Handshake ────────────────────────────────────────────────
    transport
        .send(&Frame::Hello {
            token: inner.token.clone(),
        })
        .await?;
    set_state_from_driver(inner, generation, ConnectionState::Authenticating);

    let hello = await_hello_ok(&mut transport, inner.handshake_timeout).await?;
    tracing::info!(
        server_version = %hello.server.version,
        uptime_ms = hello.snapshot.uptime_ms,
        "gateway accepted hello"
    );

    // ── Live session: writer task + reader loop ─────────────────
    let (writer_half, mut reader) = transport.into_split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(64);
    if !enter_connected(inner, generation, hello, outbound_tx) {
        return Ok(false);
    }

    let writer_task = tokio::spawn(async move {
        let mut writer = writer_half;
        while let Some(frame) = outbound_rx.recv().await {
            if let Err(e) = writer.send(&frame).await {
                tracing::warn!(error = %e, "outbound send failed");
                break;
            }
        }
        writer.close().await;
    });

    let result = read_loop(inner, &mut reader).await;

    // ── Per-connection teardown ─────────────────────────────────
    inner.outbound.lock().take();
    writer_task.abort();
    inner
        .correlation
        .fail_all(|| GatewayError::Transport("connection lost".into()));

    result.map(|()| true)
}

/// Wait for the gateway's `hello-ok`. A clean close before it arrives is
/// the gateway refusing the hello; an I/O failure or timeout is a
/// transport fault and stays retryable.
async fn await_hello_ok(
    transport: &mut Transport,
    timeout: Duration,
) -> Result<HelloOk, GatewayError> {
    let wait = async {
        loop {
            match transport.next().await {
                Ok(Some(Frame::HelloOk { server, snapshot })) => {
                    return Ok(HelloOk { server, snapshot });
                }
                Ok(Some(frame)) => {
                    tracing::debug!(?frame, "ignoring frame before hello-ok");
                }
                Ok(None) => {
                    return Err(GatewayError::Auth(
                        "gateway closed the connection during handshake".into(),
                    ));
                }
                Err(RecvError::Frame(e)) => {
                    tracing::warn!(error = %e, "dropping malformed frame during handshake");
                }
                Err(RecvError::Io(e)) => return Err(GatewayError::Transport(e)),
            }
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(outcome) => outcome,
        Err(_) => Err(GatewayError::Transport("handshake timed out".into())),
    }
}

/// Pump inbound frames until the connection ends. Malformed frames are
/// dropped with a diagnostic; the connection stays open.
async fn read_loop(
    inner: &Arc<ClientInner>,
    reader: &mut TransportReader,
) -> Result<(), GatewayError> {
    loop {
        match reader.next().await {
            Ok(Some(frame)) => handle_frame(inner, frame),
            Ok(None) => return Ok(()),
            Err(RecvError::Frame(e)) => {
                tracing::warn!(error = %e, "dropping malformed frame");
            }
            Err(RecvError::Io(e)) => return Err(GatewayError::Transport(e)),
        }
    }
}

/// Dispatch one inbound frame. Event fan-out runs synchronously here:
/// each frame's dispatch fully completes before the next frame is read.
fn handle_frame(inner: &Arc<ClientInner>, frame: Frame) {
    match frame {
        Frame::RpcResult { id, result } => {
            inner.correlation.complete(id, Ok(result));
        }
        Frame::RpcError { id, error } => {
            inner.correlation.complete(id, Err(GatewayError::from(error)));
        }
        Frame::Event { event, payload } => {
            inner.events.dispatch(&event, &payload);
        }
        Frame::HelloOk { .. } => {
            tracing::debug!("ignoring duplicate hello-ok");
        }
        Frame::Hello { .. } | Frame::Rpc { .. } => {
            tracing::warn!("dropping client-to-server frame sent by gateway");
        }
    }
}
