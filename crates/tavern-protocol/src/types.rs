//! Core protocol types for Tavern's wire format.
//!
//! Everything in this module travels "on the wire": it is serialized to
//! JSON, sent over a WebSocket, and parsed on the other side. There are
//! exactly two framing shapes:
//!
//! - [`Envelope`]: what a client sends to the server.
//! - [`Response`]: what the server sends to a client (replies *and*
//!   unsolicited room events).
//!
//! The `data` carried by both is a [`serde_json::Value`]. The framework
//! never looks inside it for game traffic; only the game implementation
//! bound to a room knows its shape.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A process-unique identifier for a connected party (player, bot, or test
/// double).
///
/// Newtype over `String` so a `ClientId` can't be passed where a `RoomId`
/// is expected. `#[serde(transparent)]` keeps the JSON form a plain string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(String);

impl ClientId {
    /// Wraps an existing identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identity (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ClientId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier for a room.
///
/// Clients may choose their own room id on `create_room`; otherwise the
/// server generates one with [`RoomId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps an existing room id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random room id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The tag that selects which game implementation drives a room
/// (e.g. `"dice"`, `"poker"`). Fixed for the lifetime of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameType(String);

impl GameType {
    /// Wraps a game-type tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// Returns the tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GameType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl From<String> for GameType {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

// ---------------------------------------------------------------------------
// Message type tags
// ---------------------------------------------------------------------------

/// Well-known values of the `type` field.
///
/// Inbound tags in the first group are handled by the router itself; any
/// other inbound tag is forwarded to the room's game verbatim.
pub mod tags {
    /// Create a room and join it.
    pub const CREATE_ROOM: &str = "create_room";
    /// Join an existing room by id.
    pub const JOIN_ROOM: &str = "join_room";
    /// Leave the current room.
    pub const LEAVE_ROOM: &str = "leave_room";
    /// Resume a previous identity's room seat.
    pub const RECONNECT: &str = "reconnect";
    /// Ask the room's game for a bot player.
    pub const ADD_BOT: &str = "add_bot";
    /// Generic game move, forwarded to the game.
    pub const GAME_ACTION: &str = "game_action";

    /// Failure reply to `create_room`. A successful create replies with
    /// [`JOIN_ROOM_RESULT`], since the creator has joined the room.
    pub const CREATE_ROOM_RESULT: &str = "create_room_result";
    /// Reply to `join_room` (and successful `create_room`).
    pub const JOIN_ROOM_RESULT: &str = "join_room_result";
    /// Reply to `leave_room`.
    pub const LEAVE_ROOM_RESULT: &str = "leave_room_result";
    /// Reply to `reconnect`.
    pub const RECONNECT_RESULT: &str = "reconnect_result";
    /// Reply to `add_bot`.
    pub const ADD_BOT_RESULT: &str = "add_bot_result";

    /// Sent once after a connection is accepted.
    pub const CONNECTED: &str = "connected";
    /// Another member joined the room.
    pub const CLIENT_JOINED: &str = "client_joined";
    /// Another member left the room.
    pub const CLIENT_LEFT: &str = "client_left";
    /// Another member's transport dropped; their seat is held.
    pub const CLIENT_DISCONNECTED: &str = "client_disconnected";
    /// A held seat was resumed under a new identity.
    pub const CLIENT_RECONNECTED: &str = "client_reconnected";
    /// The room was closed.
    pub const ROOM_CLOSED: &str = "room_closed";
    /// The inbound frame could not be parsed.
    pub const ERROR: &str = "error";

    /// Returns the reply tag for an arbitrary (game-defined) inbound tag.
    pub fn result_of(message_type: &str) -> String {
        format!("{message_type}_result")
    }
}

// ---------------------------------------------------------------------------
// Envelope (inbound)
// ---------------------------------------------------------------------------

/// The inbound wire unit. Every frame a client sends is one `Envelope`.
///
/// ```text
/// { "type": "join_room", "roomId": "abc", "data": { ... } }
/// ```
///
/// `roomId` and `gameType` are only meaningful for some message types, so
/// they're optional. `data` defaults to `null` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Message type tag (see [`tags`]).
    #[serde(rename = "type")]
    pub message_type: String,

    /// Target room, where the message type needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,

    /// Game-type tag, used by `create_room`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_type: Option<GameType>,

    /// Opaque payload.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Creates an envelope with only a type tag and payload.
    pub fn new(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            room_id: None,
            game_type: None,
            data,
        }
    }

    /// Sets the room id.
    pub fn with_room(mut self, room_id: RoomId) -> Self {
        self.room_id = Some(room_id);
        self
    }

    /// Sets the game-type tag.
    pub fn with_game_type(mut self, game_type: GameType) -> Self {
        self.game_type = Some(game_type);
        self
    }
}

// ---------------------------------------------------------------------------
// Response (outbound)
// ---------------------------------------------------------------------------

/// The outbound wire unit: replies to requests and room events alike.
///
/// ```text
/// { "type": "join_room_result", "success": true, "data": { "roomId": "abc" } }
/// { "type": "leave_room_result", "success": false, "error": "Client not in a room" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Message type tag (see [`tags`]).
    #[serde(rename = "type")]
    pub message_type: String,

    /// Whether the request succeeded. Events are always `true`.
    pub success: bool,

    /// Human-readable failure reason, present only when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Opaque payload.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Response {
    /// A successful reply or event carrying `data`.
    pub fn ok(message_type: impl Into<String>, data: Value) -> Self {
        Self {
            message_type: message_type.into(),
            success: true,
            error: None,
            data,
        }
    }

    /// A failed reply carrying an error message.
    pub fn fail(message_type: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            success: false,
            error: Some(error.into()),
            data: Value::Null,
        }
    }

    /// Returns `true` for failure responses.
    pub fn is_error(&self) -> bool {
        !self.success
    }
}

// ---------------------------------------------------------------------------
// Typed payloads for router-handled messages
// ---------------------------------------------------------------------------

/// Payload of a `reconnect` envelope.
///
/// The token is the secret handed out in the `connected` message; it is
/// what stops a third party from resuming someone else's seat by guessing
/// their client id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectRequest {
    /// The identity the connection had before it dropped.
    pub client_id: ClientId,
    /// The reconnect token issued to that identity.
    pub reconnect_token: String,
}

/// Payload of the `connected` message sent when a connection opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Welcome {
    /// The identity assigned to this connection.
    pub client_id: ClientId,
    /// Secret to present in a later `reconnect`.
    pub reconnect_token: String,
}

// =========================================================================
// Tests
// =========================================================================
