//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each accepted socket is split in two and driven by a pair of tasks:
//!
//! ```text
//!             ┌────────────┐   mpsc (bounded)   ┌─────────────┐
//! Outbound ──▶│ write pump │──────────────────▶ │   socket    │
//!             └────────────┘   + ping interval  │             │
//!             ┌────────────┐                    │             │
//! Inbound  ◀──│ read pump  │◀────────────────── │             │
//!             └────────────┘   size cap, pong   └─────────────┘
//!                                deadline
//! ```
//!
//! Both pumps watch a shared shutdown flag. Whichever side notices the
//! connection is gone first flips it, and the other one exits too.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::{ConnectionId, Transport, TransportConfig, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Frames buffered between the read pump and the consumer.
const INBOUND_BUFFER: usize = 64;

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
    config: TransportConfig,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    ///
    /// Bind to port `0` to let the OS pick one, then read it back with
    /// [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str, config: TransportConfig) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener, config })
    }

    /// Returns the address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::AcceptFailed)
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async_with_config(
            stream,
            Some(websocket_config(&self.config)),
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        Ok(WebSocketConnection {
            id,
            addr,
            ws,
            config: self.config.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Connection
// ---------------------------------------------------------------------------

/// An accepted WebSocket connection whose pumps have not started yet.
pub struct WebSocketConnection {
    id: ConnectionId,
    addr: SocketAddr,
    ws: WsStream,
    config: TransportConfig,
}

impl WebSocketConnection {
    /// Returns the unique identifier for this connection.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Spawns the read and write pumps and hands back the two ends.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(self) -> (Outbound, Inbound) {
        let Self { id, ws, config, .. } = self;
        let (sink, stream) = ws.split();

        let (out_tx, out_rx) = mpsc::channel(config.outbound_capacity);
        let (in_tx, in_rx) = mpsc::channel(INBOUND_BUFFER);
        let shutdown = Arc::new(watch::channel(false).0);

        tokio::spawn(write_pump(
            id,
            sink,
            out_rx,
            shutdown.subscribe(),
            config.ping_interval,
        ));
        tokio::spawn(read_pump(id, stream, in_tx, Arc::clone(&shutdown), config));

        let outbound = Outbound {
            id,
            tx: out_tx,
            shutdown,
        };
        let inbound = Inbound { rx: in_rx };
        (outbound, inbound)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Non-blocking sending half of a connection.
///
/// Cheap to clone; every clone feeds the same bounded queue.
#[derive(Clone)]
pub struct Outbound {
    id: ConnectionId,
    tx: mpsc::Sender<Vec<u8>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Outbound {
    /// Returns the connection this handle writes to.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues a frame for the write pump without waiting.
    ///
    /// # Errors
    /// - [`TransportError::ConnectionClosed`] if the connection is gone.
    /// - [`TransportError::QueueFull`] if the peer is not keeping up. The
    ///   frame is dropped.
    pub fn try_send(&self, data: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed(self.id));
        }
        match self.tx.try_send(data) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::QueueFull(self.id)),
            Err(TrySendError::Closed(_)) => Err(TransportError::ConnectionClosed(self.id)),
        }
    }

    /// Asks both pumps to stop. The write pump sends a close frame on its
    /// way out. Calling this more than once is harmless.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Whether the connection has been shut down by either side.
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Receiving half of a connection.
///
/// Dropping it makes the read pump stop at its next frame.
pub struct Inbound {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Inbound {
    /// Waits for the next text frame. Returns `None` once the connection
    /// is closed or timed out, or after the peer sent a binary or
    /// oversized frame.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

// ---------------------------------------------------------------------------
// Pumps
// ---------------------------------------------------------------------------

async fn write_pump(
    id: ConnectionId,
    mut sink: SplitSink<WsStream, Message>,
    mut frames: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
    ping_interval: Duration,
) {
    let mut ping = time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(data) = frame else { break };
                if let Err(e) = sink.send(into_message(data)).await {
                    tracing::debug!(%id, error = %e, "write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new().into())).await {
                    tracing::debug!(%id, error = %e, "ping failed");
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
    tracing::trace!(%id, "write pump stopped");
}

async fn read_pump(
    id: ConnectionId,
    mut stream: SplitStream<WsStream>,
    frames: mpsc::Sender<Vec<u8>>,
    shutdown: Arc<watch::Sender<bool>>,
    config: TransportConfig,
) {
    let mut closed = shutdown.subscribe();

    loop {
        let next = tokio::select! {
            next = time::timeout(config.pong_timeout, stream.next()) => next,
            _ = closed.changed() => break,
        };

        let message = match next {
            Err(_) => {
                tracing::info!(%id, "keepalive deadline passed, closing");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(%id, error = %e, "read failed");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        let data = match message {
            Message::Text(text) => text.as_bytes().to_vec(),
            Message::Binary(_) => {
                tracing::warn!(%id, "binary frame from peer, closing");
                break;
            }
            Message::Close(_) => break,
            // Pings and pongs only refresh the deadline.
            _ => continue,
        };

        if data.len() > config.max_frame_bytes {
            tracing::warn!(
                %id,
                len = data.len(),
                max = config.max_frame_bytes,
                "frame exceeds size cap, closing"
            );
            break;
        }

        if frames.send(data).await.is_err() {
            break;
        }
    }

    shutdown.send_replace(true);
    tracing::trace!(%id, "read pump stopped");
}

/// Tungstenite limits matching the frame cap, so an oversized message is
/// refused while it is being read instead of after it has been buffered.
fn websocket_config(config: &TransportConfig) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(config.max_frame_bytes))
        .max_frame_size(Some(config.max_frame_bytes))
}

/// Text when the payload is valid UTF-8 (what browsers expect for JSON),
/// binary otherwise.
fn into_message(data: Vec<u8>) -> Message {
    match String::from_utf8(data) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_outbound(capacity: usize) -> (Outbound, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let outbound = Outbound {
            id: ConnectionId::new(99),
            tx,
            shutdown: Arc::new(watch::channel(false).0),
        };
        (outbound, rx)
    }

    #[test]
    fn test_try_send_full_queue_returns_queue_full() {
        let (outbound, _rx) = detached_outbound(1);

        outbound.try_send(b"first".to_vec()).unwrap();
        let result = outbound.try_send(b"second".to_vec());

        assert!(matches!(result, Err(TransportError::QueueFull(_))));
    }

    #[test]
    fn test_try_send_after_close_returns_connection_closed() {
        let (outbound, _rx) = detached_outbound(4);

        outbound.close();

        assert!(outbound.is_closed());
        let result = outbound.try_send(b"late".to_vec());
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[test]
    fn test_websocket_config_caps_messages_at_frame_limit() {
        let config = TransportConfig::default().max_frame_bytes(1024);

        let ws = websocket_config(&config);

        assert_eq!(ws.max_message_size, Some(1024));
        assert_eq!(ws.max_frame_size, Some(1024));
    }

    #[test]
    fn test_into_message_picks_text_for_utf8() {
        assert!(matches!(into_message(b"{}".to_vec()), Message::Text(_)));
        assert!(matches!(into_message(vec![0xff, 0xfe]), Message::Binary(_)));
    }
}
