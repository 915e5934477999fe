use crate::ConnectionId;

/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection is closed (by either side, or by a keepalive
    /// timeout). Nothing more can be sent on it.
    #[error("connection {0} closed")]
    ConnectionClosed(ConnectionId),

    /// The connection's outbound queue is full. The frame was dropped
    /// rather than blocking the sender.
    #[error("outbound queue full for connection {0}")]
    QueueFull(ConnectionId),

    /// Binding the listener or accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),
}
