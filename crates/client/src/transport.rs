//! WebSocket transport: one duplex connection speaking [`Frame`]s.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use cl_protocol::{decode_frame, encode_frame, Frame, FrameError};

use crate::error::GatewayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reader-side failure, separated so the driver can treat a bad frame
/// (drop and continue) differently from a dead socket (reconnect).
#[derive(Debug, thiserror::Error)]
pub(crate) enum RecvError {
    #[error("{0}")]
    Frame(#[from] FrameError),
    #[error("socket: {0}")]
    Io(String),
}

/// One open duplex connection to the gateway.
///
/// Used whole during the handshake, then split so the writer and reader
/// can be pumped from separate tasks. The bearer token travels inside
/// the `hello` frame, never in the URL.
pub(crate) struct Transport {
    ws: WsStream,
}

impl Transport {
    /// Dial the gateway.
    pub async fn open(url: &str) -> Result<Self, GatewayError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| GatewayError::Transport(format!("connect failed: {e}")))?;
        Ok(Self { ws })
    }

    pub async fn send(&mut self, frame: &Frame) -> Result<(), GatewayError> {
        send_frame(&mut self.ws, frame).await
    }

    /// Next inbound frame. `Ok(None)` means the peer closed the
    /// connection.
    pub async fn next(&mut self) -> Result<Option<Frame>, RecvError> {
        next_frame(&mut self.ws).await
    }

    /// Split into independently-owned halves.
    pub fn into_split(self) -> (TransportWriter, TransportReader) {
        let (sink, stream) = self.ws.split();
        (TransportWriter { sink }, TransportReader { stream })
    }
}

pub(crate) struct TransportWriter {
    sink: SplitSink<WsStream, Message>,
}

impl TransportWriter {
    pub async fn send(&mut self, frame: &Frame) -> Result<(), GatewayError> {
        send_frame(&mut self.sink, frame).await
    }

    pub async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
    }
}

pub(crate) struct TransportReader {
    stream: SplitStream<WsStream>,
}

impl TransportReader {
    pub async fn next(&mut self) -> Result<Option<Frame>, RecvError> {
        next_frame(&mut self.stream).await
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> Result<(), GatewayError>
where
    S: SinkExt<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = encode_frame(frame)
        .map_err(|e| GatewayError::Protocol(format!("encode failed: {e}")))?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| GatewayError::Transport(format!("send failed: {e}")))
}

async fn next_frame<S>(stream: &mut S) -> Result<Option<Frame>, RecvError>
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(item) = stream.next().await {
        match item {
            Ok(Message::Text(text)) => {
                return match decode_frame(&text) {
                    Ok(frame) => Ok(Some(frame)),
                    Err(e) => Err(RecvError::Frame(e)),
                };
            }
            Ok(Message::Close(_)) => return Ok(None),
            // Pings and pongs are answered by tungstenite; binary frames
            // are not part of the protocol.
            Ok(_) => continue,
            Err(e) => return Err(RecvError::Io(e.to_string())),
        }
    }
    Ok(None)
}
