//! Error types for the session layer.

use tavern_protocol::ClientId;

/// Errors returned when a client tries to reclaim a stored session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session is stored for this client. Either it never
    /// disconnected from a room, it was already reclaimed, or the sweep
    /// purged it.
    #[error("no session stored for client {0}")]
    NotFound(ClientId),

    /// The session outlived its TTL. It stays in the store until the next
    /// sweep so the room layer can release the seat.
    #[error("session expired for client {0}")]
    Expired(ClientId),

    /// The reconnect token (or the room the client claims) doesn't match
    /// what was stored. The session is left untouched.
    #[error("session for client {0} is owned by someone else")]
    OwnershipMismatch(ClientId),
}
