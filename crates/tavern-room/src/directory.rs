//! Room directory: creates, tracks, and reaps rooms.
//!
//! The directory's lock guards only the id → room map. It is never held
//! while a room operation runs, so a busy room can't block lookups of
//! other rooms.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tavern_protocol::{GameType, RoomId};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{GameError, GameRegistry, Room, RoomError};

/// All live rooms, keyed by id.
pub struct RoomDirectory {
    rooms: Mutex<HashMap<RoomId, Arc<Room>>>,
    registry: Arc<GameRegistry>,
}

impl RoomDirectory {
    /// Creates an empty directory backed by `registry`.
    pub fn new(registry: Arc<GameRegistry>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            registry,
        }
    }

    /// The registry rooms are initialized from.
    pub fn registry(&self) -> &Arc<GameRegistry> {
        &self.registry
    }

    /// Creates and registers a room.
    ///
    /// Uses `room_id` if given, otherwise generates one. The game's
    /// `initialize_room` builds the initial state from `options`. Nothing
    /// is registered if any step fails.
    ///
    /// # Errors
    /// - [`RoomError::UnknownGameType`] if no game is registered for the tag
    /// - [`RoomError::AlreadyExists`] if `room_id` is taken
    /// - [`RoomError::Initialization`] if the game refuses
    pub fn create_room(
        &self,
        game_type: &GameType,
        room_id: Option<RoomId>,
        options: &Value,
    ) -> Result<Arc<Room>, RoomError> {
        if !self.registry.contains(game_type) {
            return Err(RoomError::UnknownGameType(game_type.clone()));
        }

        let room_id = room_id.unwrap_or_else(RoomId::generate);
        if self.lock().contains_key(&room_id) {
            return Err(RoomError::AlreadyExists(room_id));
        }

        let room = Room::new(room_id.clone(), game_type.clone());
        let state = self
            .registry
            .initialize_room(&room, options)
            .map_err(|e| match e {
                GameError::UnregisteredType(t) => RoomError::UnknownGameType(t),
                other => RoomError::Initialization(other.to_string()),
            })?;
        room.replace_state(state)?;

        match self.lock().entry(room_id.clone()) {
            Entry::Occupied(_) => return Err(RoomError::AlreadyExists(room_id)),
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&room));
            }
        }

        tracing::info!(%room_id, %game_type, "room created");
        Ok(room)
    }

    /// Looks a room up by id.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no such room is registered.
    pub fn get_room(&self, room_id: &RoomId) -> Result<Arc<Room>, RoomError> {
        self.lock()
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))
    }

    /// Deregisters and closes a room.
    pub fn remove_room(&self, room_id: &RoomId) -> Option<Arc<Room>> {
        let room = self.lock().remove(room_id)?;
        room.close();
        tracing::info!(%room_id, "room removed");
        Some(room)
    }

    /// Closes and deregisters every room that is empty or already closed.
    /// Returns the ids removed.
    pub fn cleanup(&self) -> Vec<RoomId> {
        let snapshot: Vec<(RoomId, Arc<Room>)> = self
            .lock()
            .iter()
            .map(|(id, room)| (id.clone(), Arc::clone(room)))
            .collect();

        let idle: Vec<(RoomId, Arc<Room>)> = snapshot
            .into_iter()
            .filter(|(_, room)| room.is_closed() || room.member_count() == 0)
            .collect();
        if idle.is_empty() {
            return Vec::new();
        }

        let mut removed = Vec::with_capacity(idle.len());
        {
            let mut rooms = self.lock();
            for (id, room) in &idle {
                // Skip if the id was reused for a new room meanwhile.
                if rooms.get(id).is_some_and(|current| Arc::ptr_eq(current, room)) {
                    rooms.remove(id);
                    removed.push(id.clone());
                }
            }
        }

        for (_, room) in &idle {
            room.close();
        }
        tracing::debug!(removed = removed.len(), "room cleanup finished");
        removed
    }

    /// Spawns a task that runs [`cleanup`](Self::cleanup) every
    /// `interval`. Abort the returned handle to stop it.
    pub fn spawn_cleanup(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.cleanup();
            }
        })
    }

    /// Returns the number of registered rooms.
    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    /// Returns the ids of all registered rooms.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<RoomId, Arc<Room>>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
