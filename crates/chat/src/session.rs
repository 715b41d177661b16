//! Streaming chat session layered on the gateway client.
//!
//! The session owns a local message list and folds `chat` events into
//! it: a `delta` carries the run's full accumulated text (replace, never
//! append), `final` seals the turn, `aborted`/`error` mark it without
//! discarding content. Everything goes over the client's `rpc` and
//! `on("chat", …)` — there is no separate transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::Notify;

use cl_client::{GatewayClient, GatewayError, Subscription};
use cl_protocol::{
    methods, ChatAbortParams, ChatEvent, ChatEventState, ChatHistoryParams, ChatSendParams,
};

use crate::extract::extract_text;
use crate::message::{ChatMessage, MessageRole};

/// Default number of entries requested by [`ChatSession::load_history`].
pub const DEFAULT_HISTORY_LIMIT: u32 = 50;

/// Mutable turn state, shared between the session handle and its event
/// subscription.
#[derive(Default)]
struct TurnState {
    messages: Mutex<Vec<ChatMessage>>,
    current_run: Mutex<Option<String>>,
    streaming: AtomicBool,
    last_error: Mutex<Option<String>>,
    /// Notified after every applied event.
    changed: Notify,
}

fn find_run<'a>(
    messages: &'a mut [ChatMessage],
    run_id: &str,
) -> Option<&'a mut ChatMessage> {
    messages
        .iter_mut()
        .find(|m| m.role == MessageRole::Assistant && m.run_id.as_deref() == Some(run_id))
}

impl TurnState {
    /// Fold one gateway chat event into the local view. The caller has
    /// already checked session-key attribution.
    fn apply(&self, event: ChatEvent) {
        match event.state {
            ChatEventState::Delta => {
                self.streaming.store(true, Ordering::SeqCst);
                *self.current_run.lock() = Some(event.run_id.clone());
                let text = extract_text(&event.message);
                {
                    let mut messages = self.messages.lock();
                    match find_run(&mut messages, &event.run_id) {
                        Some(existing) => {
                            existing.content = text;
                            existing.state = Some(ChatEventState::Delta);
                        }
                        None => messages.push(ChatMessage::assistant(
                            &event.run_id,
                            text,
                            ChatEventState::Delta,
                        )),
                    }
                }
            }
            ChatEventState::Final => {
                self.finish();
                let text = extract_text(&event.message);
                {
                    let mut messages = self.messages.lock();
                    if let Some(m) = find_run(&mut messages, &event.run_id) {
                        // An empty final keeps the last delta's text.
                        if !text.is_empty() {
                            m.content = text;
                        }
                        m.state = Some(ChatEventState::Final);
                    }
                }
            }
            state @ (ChatEventState::Aborted | ChatEventState::Error) => {
                self.finish();
                if let Some(reason) = event.error_message {
                    *self.last_error.lock() = Some(reason);
                }
                {
                    let mut messages = self.messages.lock();
                    if let Some(m) = find_run(&mut messages, &event.run_id) {
                        m.state = Some(state);
                    }
                }
            }
        }
        self.changed.notify_waiters();
    }

    fn finish(&self) {
        self.streaming.store(false, Ordering::SeqCst);
        *self.current_run.lock() = None;
    }
}

/// One conversation bound to a fully-qualified session key.
///
/// Events are attributed by exact equality against that key; the gateway
/// echoes fully-qualified keys (`agent:<agentId>:<key>`) on every chat
/// event.
pub struct ChatSession {
    client: GatewayClient,
    session_key: String,
    history_limit: u32,
    turn: Arc<TurnState>,
    subscription: Option<Subscription>,
}

impl ChatSession {
    /// Subscribe to chat events for `session_key` on `client`. The
    /// subscription lives until the session is dropped or
    /// [`detach`](Self::detach)ed.
    pub fn attach(client: &GatewayClient, session_key: impl Into<String>) -> Self {
        let session_key = session_key.into();
        let turn = Arc::new(TurnState::default());

        let sub_turn = Arc::clone(&turn);
        let expected = session_key.clone();
        let subscription = client.on(methods::EVENT_CHAT, move |payload| {
            let event: ChatEvent = match serde_json::from_value(payload.clone()) {
                Ok(event) => event,
                Err(e) => {
                    tracing::debug!(error = %e, "ignoring unparseable chat event");
                    return;
                }
            };
            if event.session_key != expected {
                return;
            }
            sub_turn.apply(event);
        });

        Self {
            client: client.clone(),
            session_key,
            history_limit: DEFAULT_HISTORY_LIMIT,
            turn,
            subscription: Some(subscription),
        }
    }

    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    /// Entries requested per [`load_history`](Self::load_history) call.
    pub fn set_history_limit(&mut self, limit: u32) {
        self.history_limit = limit;
    }

    /// Send one user message.
    ///
    /// The optimistic local message stays even if the rpc fails; the
    /// failure is recorded as the turn error and returned. Whitespace-only
    /// input is a no-op.
    pub async fn send(&self, text: &str) -> Result<(), GatewayError> {
        if text.trim().is_empty() {
            return Ok(());
        }

        *self.turn.last_error.lock() = None;
        self.turn.messages.lock().push(ChatMessage::user(text));

        let params = ChatSendParams {
            session_key: self.session_key.clone(),
            message: text.to_string(),
            idempotency_key: uuid::Uuid::new_v4().to_string(),
        };
        match self.client.rpc(methods::CHAT_SEND, to_params(&params)?).await {
            Ok(_) => Ok(()),
            Err(err) => {
                *self.turn.last_error.lock() = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Request cancellation of the in-flight run. No-op when nothing is
    /// streaming.
    ///
    /// Cancellation is cooperative: the local streaming flag clears
    /// immediately, actual termination is confirmed by a later `aborted`
    /// event. A failed rpc is logged and accepted — the run may dangle
    /// server-side.
    pub async fn abort(&self) {
        let Some(run_id) = self.turn.current_run.lock().clone() else {
            return;
        };

        let params = ChatAbortParams {
            session_key: self.session_key.clone(),
            run_id,
        };
        match to_params(&params) {
            Ok(value) => {
                if let Err(e) = self.client.rpc(methods::CHAT_ABORT, value).await {
                    tracing::debug!(error = %e, "chat.abort failed");
                }
            }
            Err(e) => tracing::debug!(error = %e, "chat.abort skipped"),
        }
        self.turn.streaming.store(false, Ordering::SeqCst);
    }

    /// Fetch server-side history, mapped through the same text
    /// extraction as live events and tagged `final`. A non-empty result
    /// replaces the local view; an empty one leaves it untouched.
    pub async fn load_history(&self) -> Result<usize, GatewayError> {
        let params = ChatHistoryParams {
            session_key: self.session_key.clone(),
            limit: self.history_limit,
        };
        let result = self
            .client
            .rpc(methods::CHAT_HISTORY, to_params(&params)?)
            .await?;

        let mapped = map_history(&result);
        let count = mapped.len();
        if count > 0 {
            *self.turn.messages.lock() = mapped;
            self.turn.changed.notify_waiters();
        }
        Ok(count)
    }

    /// Snapshot of the local conversation.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.turn.messages.lock().clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.streaming.load(Ordering::SeqCst)
    }

    pub fn current_run_id(&self) -> Option<String> {
        self.turn.current_run.lock().clone()
    }

    /// The turn-scoped error, if any (send failure or an `error` event's
    /// message). Connection-level errors are the client's concern.
    pub fn last_error(&self) -> Option<String> {
        self.turn.last_error.lock().clone()
    }

    pub fn take_error(&self) -> Option<String> {
        self.turn.last_error.lock().take()
    }

    /// Resolve after the next applied event, or `false` on timeout.
    pub async fn next_change(&self, timeout: Duration) -> bool {
        let notified = self.turn.changed.notified();
        tokio::time::timeout(timeout, notified).await.is_ok()
    }

    /// Wait until the current turn settles (final, aborted, or error).
    /// Returns immediately — `true` — when nothing is streaming.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.is_streaming() {
                return true;
            }
            let notified = self.turn.changed.notified();
            if !self.is_streaming() {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return !self.is_streaming();
            }
        }
    }

    /// Drop the event subscription and discard the session.
    pub fn detach(mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }
}

fn to_params<T: serde::Serialize>(params: &T) -> Result<Value, GatewayError> {
    serde_json::to_value(params).map_err(|e| GatewayError::Protocol(e.to_string()))
}

/// Map a `chat.history` result into local messages. Accepts both the
/// `{ "messages": [...] }` object shape and a bare array.
fn map_history(result: &Value) -> Vec<ChatMessage> {
    let entries: &[Value] = match result {
        Value::Array(items) => items,
        Value::Object(obj) => match obj.get("messages") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        _ => return Vec::new(),
    };

    entries
        .iter()
        .map(|entry| ChatMessage {
            id: entry
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            role: match entry.get("role").and_then(Value::as_str) {
                Some("user") => MessageRole::User,
                _ => MessageRole::Assistant,
            },
            content: extract_text(entry),
            timestamp: entry
                .get("timestamp")
                .and_then(Value::as_i64)
                .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            state: Some(ChatEventState::Final),
            run_id: None,
        })
        .collect()
}
