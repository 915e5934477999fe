//! Error types for the room layer.

use tavern_protocol::{ClientId, GameType, RoomId};

/// Errors that can occur during room and directory operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist.
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room has closed. Closed rooms never reopen.
    #[error("room {0} is closed")]
    Closed(RoomId),

    /// No game is registered under this tag.
    #[error("Unknown game type: {0}")]
    UnknownGameType(GameType),

    /// A room with the requested id is already registered.
    #[error("room {0} already exists")]
    AlreadyExists(RoomId),

    /// The client is not a member of this room.
    #[error("client {0} not in room {1}")]
    NotInRoom(ClientId, RoomId),

    /// The room's state is not of the type the caller asked for.
    #[error("state of room {0} has a different type")]
    StateTypeMismatch(RoomId),

    /// The game refused to initialize the room.
    #[error("room initialization failed: {0}")]
    Initialization(String),
}

/// Errors returned by [`Client::send`](crate::Client::send).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// The client is closed or disconnected.
    #[error("client {0} is closed")]
    Closed(ClientId),

    /// The client's outbound buffer is full. The message was dropped.
    #[error("outbound buffer full for client {0}")]
    Full(ClientId),

    /// The message could not be serialized for the wire.
    #[error("could not encode message for client {0}: {1}")]
    Encode(ClientId, String),
}

/// Errors raised by game implementations and the registry that
/// dispatches to them.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// No game is registered under this tag.
    #[error("Unknown game type: {0}")]
    UnregisteredType(GameType),

    /// The game does not support bots.
    #[error("Game type {0} does not support bots")]
    BotsUnsupported(GameType),

    /// The game has no record of this client.
    #[error("Unknown client: {0}")]
    UnknownClient(ClientId),

    /// The action was rejected by the game's rules.
    #[error("{0}")]
    InvalidAction(String),

    /// A room operation failed inside a game callback.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Anything else a game wants to report.
    #[error("{0}")]
    Other(String),
}
