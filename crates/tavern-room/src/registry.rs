//! Game registry: maps game-type tags to [`Game`] implementations and
//! forwards hook calls to the right one.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tavern_protocol::{ClientId, GameType};

use crate::{ClientRef, Game, GameError, Room, RoomState};

/// Dispatch table from game-type tag to game.
///
/// The lock is held only to look a game up. Hooks run after it is
/// released, so games may call back into the registry.
#[derive(Default)]
pub struct GameRegistry {
    games: RwLock<HashMap<GameType, Arc<dyn Game>>>,
}

impl GameRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `game` under its own tag, replacing and returning any
    /// game previously registered under that tag.
    pub fn register_game(&self, game: Arc<dyn Game>) -> Option<Arc<dyn Game>> {
        let game_type = game.game_type();
        tracing::info!(%game_type, "game registered");
        self.games
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(game_type, game)
    }

    /// Looks a game up by tag.
    ///
    /// # Errors
    /// [`GameError::UnregisteredType`] if nothing is registered under it.
    pub fn get_game(&self, game_type: &GameType) -> Result<Arc<dyn Game>, GameError> {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(game_type)
            .cloned()
            .ok_or_else(|| GameError::UnregisteredType(game_type.clone()))
    }

    /// Whether a game is registered under this tag.
    pub fn contains(&self, game_type: &GameType) -> bool {
        self.games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(game_type)
    }

    /// Registered tags, sorted.
    pub fn game_types(&self) -> Vec<GameType> {
        let mut types: Vec<GameType> = self
            .games
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        types.sort();
        types
    }

    // -- Dispatch ---------------------------------------------------------
    //
    // Each method resolves the room's game and forwards unchanged.

    pub fn initialize_room(&self, room: &Arc<Room>, options: &Value) -> Result<RoomState, GameError> {
        self.get_game(room.game_type())?.initialize_room(room, options)
    }

    pub fn handle_message(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        message_type: &str,
        payload: Value,
    ) -> Result<Option<Value>, GameError> {
        self.get_game(room.game_type())?
            .handle_message(client, room, message_type, payload)
    }

    pub fn on_client_join(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        options: &Value,
    ) -> Result<(), GameError> {
        self.get_game(room.game_type())?.on_client_join(client, room, options)
    }

    pub fn on_client_leave(&self, client: &ClientRef, room: &Arc<Room>) -> Result<(), GameError> {
        self.get_game(room.game_type())?.on_client_leave(client, room)
    }

    pub fn on_client_reconnect(
        &self,
        client: &ClientRef,
        room: &Arc<Room>,
        old_id: &ClientId,
    ) -> Result<(), GameError> {
        self.get_game(room.game_type())?
            .on_client_reconnect(client, room, old_id)
    }

    pub fn on_bot_add(
        self: &Arc<Self>,
        client: &ClientRef,
        room: &Arc<Room>,
    ) -> Result<ClientRef, GameError> {
        self.get_game(room.game_type())?.on_bot_add(client, room, self)
    }
}
