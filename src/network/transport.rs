//! Client Transport
//!
//! Client end of a lobby connection. A reader task decodes inbound binary
//! frames into a queue that the tick handler drains at the start of each
//! frame. Outbound messages are encoded by `send` and written by a
//! writer task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::network::codec::{ClientMessage, CodecError, ServerMessage};
use crate::network::lobby::{HandshakeReply, JoinInfo};
use crate::network::server::LobbyRoute;

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Bad server URL.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Handshake reply was not valid JSON.
    #[error("Invalid handshake reply: {0}")]
    Handshake(#[from] serde_json::Error),

    /// Outbound message could not be encoded.
    #[error("Encode failed: {0}")]
    Codec(#[from] CodecError),

    /// The server refused the lobby request.
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// First frame was not a handshake reply.
    #[error("Unexpected frame before handshake reply")]
    UnexpectedFrame,

    /// The connection is gone.
    #[error("Connection closed")]
    Closed,
}

/// An open lobby connection.
pub struct ClientTransport {
    info: JoinInfo,
    inbound: mpsc::Receiver<ServerMessage>,
    outbound: Option<mpsc::Sender<Vec<u8>>>,
    closed: bool,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ClientTransport {
    /// Connect to `base` (`ws://host:port`) and perform the lobby handshake.
    pub async fn connect(base: &str, route: &LobbyRoute) -> Result<Self, TransportError> {
        let url = route.url(base)?;
        debug!("Connecting to {}", url);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let info = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<HandshakeReply>(&text)? {
                    HandshakeReply::Joined(info) => break info,
                    HandshakeReply::Rejected { error } => return Err(TransportError::Rejected(error)),
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => return Err(TransportError::UnexpectedFrame),
                Some(Err(e)) => return Err(e.into()),
            }
        };
        info!("Joined lobby {} with {:?}", info.code, info.players);

        let (inbound_tx, inbound) = mpsc::channel::<ServerMessage>(256);
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Vec<u8>>(64);

        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Binary(data)) => match ServerMessage::decode(&data) {
                        Ok(msg) => {
                            if inbound_tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed server frame ({} bytes): {}", data.len(), e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            debug!("Reader task ended");
        });

        let writer = tokio::spawn(async move {
            while let Some(bytes) = outbound_rx.recv().await {
                if let Err(e) = write.send(Message::Binary(bytes)).await {
                    warn!("Failed to send message: {}", e);
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
            debug!("Writer task ended");
        });

        Ok(Self {
            info,
            inbound,
            outbound: Some(outbound_tx),
            closed: false,
            reader,
            writer,
        })
    }

    /// Lobby handshake reply.
    pub fn info(&self) -> &JoinInfo {
        &self.info
    }

    /// Encode a message and queue it for sending.
    pub async fn send(&self, msg: ClientMessage) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        let bytes = msg.encode()?;
        tx.send(bytes).await.map_err(|_| TransportError::Closed)
    }

    /// Take every message received so far, in arrival order.
    pub fn drain(&mut self) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(msg) => messages.push(msg),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
        messages
    }

    /// Wait for the next message. `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<ServerMessage> {
        let msg = self.inbound.recv().await;
        if msg.is_none() {
            self.closed = true;
        }
        msg
    }

    /// Whether the server side has gone away (observed by `drain`/`recv`).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Flush pending sends and close the connection.
    pub async fn close(mut self) {
        self.outbound = None;
        if let Err(e) = (&mut self.writer).await {
            debug!("Writer task join failed: {}", e);
        }
        self.reader.abort();
    }
}

impl Drop for ClientTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
