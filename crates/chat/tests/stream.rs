//! Integration tests: drive a scripted chat turn through an in-process
//! gateway and assert the session's local view.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use cl_chat::{ChatEventState, ChatSession, MessageRole};
use cl_client::GatewayClient;
use cl_protocol::{Frame, ServerInfo, Snapshot};

const SESSION_KEY: &str = "agent:main:stream-test";

// ── Mini gateway (accepting handshake, frames relayed to the test) ──────

struct GatewayConn {
    send: mpsc::Sender<Frame>,
    recv: mpsc::Receiver<Frame>,
}

impl GatewayConn {
    async fn push(&self, frame: Frame) {
        self.send.send(frame).await.unwrap();
    }

    async fn push_chat(&self, payload: serde_json::Value) {
        self.push(Frame::Event {
            event: "chat".into(),
            payload,
        })
        .await;
    }

    async fn expect_rpc(&mut self) -> (u64, String, serde_json::Value) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.recv.recv()).await {
                Ok(Some(Frame::Rpc { id, method, params })) => return (id, method, params),
                Ok(Some(_)) => continue,
                Ok(None) => panic!("connection dropped before rpc frame"),
                Err(_) => panic!("timeout waiting for rpc frame"),
            }
        }
    }
}

async fn start_mini_gateway() -> (SocketAddr, mpsc::Receiver<GatewayConn>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::channel(4);

    tokio::spawn(async move {
        while let Ok((stream, _peer)) = listener.accept().await {
            let conn_tx = conn_tx.clone();
            tokio::spawn(async move {
                let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
                let (mut sink, mut stream) = ws.split();

                loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => {
                            if let Ok(Frame::Hello { .. }) = serde_json::from_str(&text) {
                                break;
                            }
                        }
                        _ => return,
                    }
                }

                let hello_ok = Frame::HelloOk {
                    server: ServerInfo {
                        version: "0.0.0-test".into(),
                    },
                    snapshot: Snapshot::default(),
                };
                let json = serde_json::to_string(&hello_ok).unwrap();
                if sink.send(Message::Text(json)).await.is_err() {
                    return;
                }

                let (push_tx, mut push_rx) = mpsc::channel::<Frame>(16);
                let (from_client_tx, from_client_rx) = mpsc::channel::<Frame>(16);
                let _ = conn_tx
                    .send(GatewayConn {
                        send: push_tx,
                        recv: from_client_rx,
                    })
                    .await;

                let read_task = tokio::spawn(async move {
                    while let Some(Ok(msg)) = stream.next().await {
                        if let Message::Text(text) = msg {
                            if let Ok(frame) = serde_json::from_str::<Frame>(&text) {
                                if from_client_tx.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
                let write_task = tokio::spawn(async move {
                    while let Some(frame) = push_rx.recv().await {
                        let json = serde_json::to_string(&frame).unwrap();
                        if sink.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                });
                let _ = tokio::join!(read_task, write_task);
            });
        }
    });

    (addr, conn_rx)
}

async fn connected_client(addr: SocketAddr, conn_rx: &mut mpsc::Receiver<GatewayConn>) -> (GatewayClient, GatewayConn) {
    let client = GatewayClient::builder()
        .url(format!("ws://{addr}/"))
        .build();
    client.connect();
    let conn = tokio::time::timeout(Duration::from_secs(5), conn_rx.recv())
        .await
        .expect("timeout waiting for connection")
        .expect("gateway task gone");
    client
        .wait_until_connected(Duration::from_secs(5))
        .await
        .unwrap();
    (client, conn)
}

/// Poll until `cond` holds, failing the test after five seconds.
async fn wait_for(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn streamed_turn_builds_one_assistant_message() {
    let (addr, mut conn_rx) = start_mini_gateway().await;
    let (client, mut conn) = connected_client(addr, &mut conn_rx).await;
    let session = ChatSession::attach(&client, SESSION_KEY);
    assert_eq!(session.session_key(), SESSION_KEY);

    // Answer chat.send in the background while send() awaits it.
    let send = tokio::spawn({
        let session_key = SESSION_KEY.to_string();
        async move {
            let (id, method, params) = conn.expect_rpc().await;
            assert_eq!(method, "chat.send");
            assert_eq!(params["sessionKey"], serde_json::json!(session_key));
            assert_eq!(params["message"], serde_json::json!("What's new?"));
            assert!(params["idempotencyKey"].as_str().is_some_and(|k| !k.is_empty()));
            conn.push(Frame::RpcResult {
                id,
                result: serde_json::json!({ "runId": "r1" }),
            })
            .await;
            conn
        }
    });

    session.send("What's new?").await.unwrap();
    let conn = send.await.unwrap();

    // Deltas carry the full accumulated text: replace, never append.
    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r1",
        "state": "delta",
        "message": "Hello"
    }))
    .await;
    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r1",
        "state": "delta",
        "message": "Hello there"
    }))
    .await;

    // An event for some other session must not bleed in.
    conn.push_chat(serde_json::json!({
        "sessionKey": "agent:main:someone-else",
        "runId": "r9",
        "state": "delta",
        "message": "wrong session"
    }))
    .await;

    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r1",
        "state": "final",
        "message": ""
    }))
    .await;

    wait_for(|| {
        session
            .messages()
            .iter()
            .any(|m| m.state == Some(ChatEventState::Final))
    })
    .await;
    assert!(session.wait_idle(Duration::from_millis(100)).await);

    let messages = session.messages();
    assert_eq!(messages.len(), 2, "one user + one assistant message");
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[0].content, "What's new?");

    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].run_id.as_deref(), Some("r1"));
    // Empty final keeps the last delta's text.
    assert_eq!(messages[1].content, "Hello there");
    assert_eq!(messages[1].state, Some(ChatEventState::Final));

    assert!(!session.is_streaming());
    assert!(session.last_error().is_none());
    client.disconnect();
}

#[tokio::test]
async fn abort_clears_streaming_even_when_the_rpc_fails() {
    let (addr, mut conn_rx) = start_mini_gateway().await;
    let (client, mut conn) = connected_client(addr, &mut conn_rx).await;
    let session = ChatSession::attach(&client, SESSION_KEY);

    // A run started elsewhere streams into this session.
    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r7",
        "state": "delta",
        "message": "thinking out loud"
    }))
    .await;
    wait_for(|| session.is_streaming()).await;
    assert_eq!(session.current_run_id().as_deref(), Some("r7"));

    // chat.abort fails server-side; the local flag clears anyway.
    let answer = tokio::spawn(async move {
        let (id, method, params) = conn.expect_rpc().await;
        assert_eq!(method, "chat.abort");
        assert_eq!(params["runId"], serde_json::json!("r7"));
        conn.push(Frame::RpcError {
            id,
            error: cl_protocol::RpcErrorPayload {
                code: None,
                message: "abort not supported".into(),
                data: None,
            },
        })
        .await;
        conn
    });

    session.abort().await;
    assert!(!session.is_streaming());

    let conn = answer.await.unwrap();

    // Content survives a later aborted event for the same run.
    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r7",
        "state": "aborted",
        "message": ""
    }))
    .await;
    wait_for(|| {
        session
            .messages()
            .iter()
            .any(|m| m.state == Some(ChatEventState::Aborted))
    })
    .await;
    assert_eq!(session.messages()[0].content, "thinking out loud");

    client.disconnect();
}

#[tokio::test]
async fn error_event_is_turn_scoped() {
    let (addr, mut conn_rx) = start_mini_gateway().await;
    let (client, conn) = connected_client(addr, &mut conn_rx).await;
    let session = ChatSession::attach(&client, SESSION_KEY);

    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r2",
        "state": "delta",
        "message": "partial answer"
    }))
    .await;
    conn.push_chat(serde_json::json!({
        "sessionKey": SESSION_KEY,
        "runId": "r2",
        "state": "error",
        "message": "",
        "errorMessage": "provider quota exhausted"
    }))
    .await;

    wait_for(|| session.last_error().is_some()).await;

    assert_eq!(
        session.last_error().as_deref(),
        Some("provider quota exhausted")
    );
    let messages = session.messages();
    assert_eq!(messages[0].content, "partial answer");
    assert_eq!(messages[0].state, Some(ChatEventState::Error));

    // The connection itself is unaffected.
    assert!(client.state().is_connected());
    assert!(!session.is_streaming());

    session.detach();
    client.disconnect();
}

#[tokio::test]
async fn history_is_mapped_and_tagged_final() {
    let (addr, mut conn_rx) = start_mini_gateway().await;
    let (client, mut conn) = connected_client(addr, &mut conn_rx).await;
    let session = ChatSession::attach(&client, SESSION_KEY);

    let answer = tokio::spawn(async move {
        let (id, method, params) = conn.expect_rpc().await;
        assert_eq!(method, "chat.history");
        assert_eq!(params["sessionKey"], serde_json::json!(SESSION_KEY));
        assert_eq!(params["limit"], serde_json::json!(50));
        conn.push(Frame::RpcResult {
            id,
            result: serde_json::json!({
                "sessionKey": SESSION_KEY,
                "messages": [
                    { "id": "m1", "role": "user", "content": "earlier question", "timestamp": 1000 },
                    {
                        "id": "m2",
                        "role": "assistant",
                        "content": [
                            { "type": "thinking", "thinking": "..." },
                            { "type": "text", "text": "earlier answer" }
                        ],
                        "timestamp": 2000
                    }
                ]
            }),
        })
        .await;
    });

    let loaded = session.load_history().await.unwrap();
    answer.await.unwrap();
    assert_eq!(loaded, 2);

    let messages = session.messages();
    assert_eq!(messages[0].content, "earlier question");
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].content, "earlier answer");
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert!(messages
        .iter()
        .all(|m| m.state == Some(ChatEventState::Final)));

    client.disconnect();
}
