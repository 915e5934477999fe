//! The `Game` trait: the main extension point for game developers.
//!
//! The core never looks inside a room's state or a game's messages. It
//! calls these hooks at the right time and relays whatever comes back:
//!
//! ```text
//! create_room ──→ initialize_room ──→ on_client_join (creator)
//! join_room   ──→ on_client_join
//! add_bot     ──→ on_bot_add ──→ on_client_join (bot)
//! any other   ──→ handle_message ──→ `<type>_result`
//! leave_room  ──→ on_client_leave
//! reconnect   ──→ on_client_reconnect
//! ```
//!
//! One `Game` instance serves every room of its type, so per-room data
//! belongs in the room's state, not in the game.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tavern_protocol::{ClientId, GameType};

use crate::{ClientRef, GameError, GameRegistry, Room};

/// A room's opaque state value.
pub type RoomState = Box<dyn Any + Send>;

/// The trait game developers implement.
///
/// Hooks run synchronously on the calling connection's task. They may call
/// [`Room::update_state`], [`Room::broadcast`] and friends freely, but must
/// not block.
pub trait Game: Send + Sync + 'static {
    /// The tag clients use in `gameType` to pick this game.
    fn game_type(&self) -> GameType;

    /// Builds the initial state for a new room. `options` is the `data`
    /// of the `create_room` envelope.
    fn initialize_room(&self, room: &Arc<Room>, options: &Value) -> Result<RoomState, GameError>;

    /// Called after a client (or bot) joins. `options` is the `data` of
    /// the join envelope. Default: no-op.
    fn on_client_join(
        &self,
        _client: &ClientRef,
        _room: &Arc<Room>,
        _options: &Value,
    ) -> Result<(), GameError> {
        Ok(())
    }

    /// Called before a client is removed from the room. Default: no-op.
    fn on_client_leave(&self, _client: &ClientRef, _room: &Arc<Room>) -> Result<(), GameError> {
        Ok(())
    }

    /// Called after `client` took over the seat of `old_id`.
    /// Default: no-op.
    fn on_client_reconnect(
        &self,
        _client: &ClientRef,
        _room: &Arc<Room>,
        _old_id: &ClientId,
    ) -> Result<(), GameError> {
        Ok(())
    }

    /// Creates a bot for `room` at `client`'s request. The router joins
    /// the returned client to the room.
    ///
    /// The registry is passed so bot reactions can dispatch actions the
    /// same way clients do. Default: bots are unsupported.
    fn on_bot_add(
        &self,
        _client: &ClientRef,
        room: &Arc<Room>,
        _registry: &Arc<GameRegistry>,
    ) -> Result<ClientRef, GameError> {
        Err(GameError::BotsUnsupported(room.game_type().clone()))
    }

    /// Handles any message type the router does not reserve. A returned
    /// value becomes the `data` of the `<type>_result` reply.
    fn handle_message(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        message_type: &str,
        payload: Value,
    ) -> Result<Option<Value>, GameError>;
}
