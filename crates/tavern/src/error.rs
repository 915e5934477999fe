//! Error types for the Tavern server.

use tavern_protocol::{GameType, ProtocolError, RoomId};
use tavern_room::{ClientError, GameError, RoomError};
use tavern_session::SessionError;
use tavern_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `tavern` crate, you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum TavernError {
    /// A transport-level error (bind, accept, send).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (not found, expired, ownership).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A room-level error (not found, closed, unknown game type).
    #[error(transparent)]
    Room(#[from] RoomError),

    /// A game implementation reported an error.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Delivering to a client failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A routed request failed.
    #[error(transparent)]
    Route(#[from] RouteError),
}

// ---------------------------------------------------------------------------
// RouteError
// ---------------------------------------------------------------------------

/// Why the router rejected a request.
///
/// The `Display` text is what the client sees in the failed response's
/// `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// The frame was not a valid envelope.
    #[error("Invalid message format")]
    MalformedEnvelope,

    /// A required envelope field was absent.
    #[error("{0} is required")]
    MissingField(&'static str),

    /// No game is registered for the requested type.
    #[error("Unknown game type: {0}")]
    UnknownGameType(GameType),

    /// No room with this id is registered.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomId),

    /// The room has closed and can't be joined.
    #[error("Room is closed: {0}")]
    RoomClosed(RoomId),

    /// A room with this id already exists.
    #[error("Room already exists: {0}")]
    RoomExists(RoomId),

    /// The request needs a current room and the client has none.
    #[error("Client not in a room")]
    NoCurrentRoom,

    /// No session is stored for the client id in a reconnect request.
    #[error("Session not found")]
    SessionNotFound,

    /// The session outlived its time-to-live.
    #[error("Session expired")]
    SessionExpired,

    /// The reconnect token or room did not match the stored session.
    #[error("Session ownership mismatch")]
    SessionOwnershipMismatch,

    /// The room's game does not support bots.
    #[error("Game type {0} does not support bots")]
    BotUnsupported(GameType),

    /// The game handler rejected the request; carries the game's text.
    #[error("{0}")]
    GameHandler(String),
}

impl From<RoomError> for RouteError {
    fn from(err: RoomError) -> Self {
        match err {
            RoomError::NotFound(id) => Self::RoomNotFound(id),
            RoomError::Closed(id) => Self::RoomClosed(id),
            RoomError::UnknownGameType(t) => Self::UnknownGameType(t),
            RoomError::AlreadyExists(id) => Self::RoomExists(id),
            RoomError::NotInRoom(..) => Self::NoCurrentRoom,
            RoomError::Initialization(msg) => Self::GameHandler(msg),
            other @ RoomError::StateTypeMismatch(_) => Self::GameHandler(other.to_string()),
        }
    }
}

impl From<SessionError> for RouteError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(_) => Self::SessionNotFound,
            SessionError::Expired(_) => Self::SessionExpired,
            SessionError::OwnershipMismatch(_) => Self::SessionOwnershipMismatch,
        }
    }
}

impl From<GameError> for RouteError {
    fn from(err: GameError) -> Self {
        match err {
            GameError::UnregisteredType(t) => Self::UnknownGameType(t),
            GameError::BotsUnsupported(t) => Self::BotUnsupported(t),
            GameError::Room(e) => e.into(),
            other => Self::GameHandler(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tavern_protocol::ClientId;

    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::QueueFull(tavern_transport::ConnectionId::new(3));
        let tavern_err: TavernError = err.into();
        assert!(matches!(tavern_err, TavernError::Transport(_)));
        assert!(tavern_err.to_string().contains("conn-3"));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::Expired(ClientId::from("p1"));
        let tavern_err: TavernError = err.into();
        assert!(matches!(tavern_err, TavernError::Session(_)));
    }

    #[test]
    fn test_route_error_no_current_room_text() {
        assert_eq!(RouteError::NoCurrentRoom.to_string(), "Client not in a room");
    }

    #[test]
    fn test_route_error_from_room_error_maps_variants() {
        let closed: RouteError = RoomError::Closed(RoomId::from("r1")).into();
        assert_eq!(closed, RouteError::RoomClosed(RoomId::from("r1")));

        let unknown: RouteError = RoomError::UnknownGameType(GameType::from("chess")).into();
        assert_eq!(unknown.to_string(), "Unknown game type: chess");
    }

    #[test]
    fn test_route_error_from_game_error_keeps_game_text() {
        let err: RouteError = GameError::InvalidAction("Not your turn".into()).into();
        assert_eq!(err.to_string(), "Not your turn");

        let nested: RouteError = GameError::Room(RoomError::Closed(RoomId::from("r1"))).into();
        assert!(matches!(nested, RouteError::RoomClosed(_)));
    }
}
