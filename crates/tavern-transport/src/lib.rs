//! Transport layer for Tavern.
//!
//! Accepts WebSocket connections and turns each one into a pair of
//! handles:
//!
//! - [`Outbound`]: a cloneable, non-blocking sender backed by a bounded
//!   queue. A write pump drains it onto the socket and sends keepalive
//!   pings.
//! - [`Inbound`]: the receiving end. A read pump forwards frames here,
//!   enforcing the frame size cap and the keepalive deadline.
//!
//! Upper layers never touch the socket directly, so a slow peer can only
//! ever fill its own queue.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{Inbound, Outbound, WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::time::Duration;

/// Opaque identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Per-connection transport limits.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use tavern_transport::TransportConfig;
///
/// let config = TransportConfig::default()
///     .max_frame_bytes(16 * 1024)
///     .pong_timeout(Duration::from_secs(10));
/// assert_eq!(config.max_frame_bytes, 16 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Largest inbound frame accepted. Bigger frames close the connection.
    pub max_frame_bytes: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// How often the write pump pings the peer.
    pub ping_interval: Duration,
    /// How long the read pump waits for any frame (pongs included)
    /// before declaring the peer dead.
    pub pong_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: 64 * 1024,
            outbound_capacity: 256,
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl TransportConfig {
    /// Sets the inbound frame size cap.
    pub fn max_frame_bytes(mut self, bytes: usize) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Sets the outbound queue capacity.
    pub fn outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }

    /// Sets the keepalive ping interval.
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Sets the keepalive deadline.
    pub fn pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// The connection type produced by this transport.
    type Connection: Send + 'static;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming connection.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}
