//! The `Client` trait: anything a room can deliver messages to.
//!
//! Three implementations exist:
//!
//! - the live WebSocket client in the `tavern` crate
//! - [`BotClient`](crate::BotClient), a synthetic member driven by game code
//! - [`MockClient`](crate::MockClient), which just records for tests
//!
//! Rooms hold clients as [`ClientRef`] (`Arc<dyn Client>`). A client points
//! back at its room weakly through a [`RoomLink`], so a client never keeps
//! a closed room alive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tavern_protocol::{ClientId, Response};

use crate::{ClientError, Room};

/// A participant in at most one room at a time.
pub trait Client: Send + Sync + 'static {
    /// The client's process-unique identity.
    fn id(&self) -> &ClientId;

    /// Delivers a response. Must not block.
    ///
    /// # Errors
    /// - [`ClientError::Closed`] if the client is closed or disconnected
    /// - [`ClientError::Full`] if its outbound buffer is full
    fn send(&self, response: Response) -> Result<(), ClientError>;

    /// The room this client currently sits in, if it is still alive.
    fn room(&self) -> Option<Arc<Room>>;

    /// Points the client at a room, or detaches it with `None`. Called by
    /// [`Room`] on join, leave and close.
    fn set_room(&self, room: Option<&Arc<Room>>);

    /// Closes the client and leaves its current room. Idempotent.
    fn close(&self);
}

/// Shared handle to any client.
pub type ClientRef = Arc<dyn Client>;

/// A weak, lockable back-reference from a client to its room.
///
/// Every [`Client`] implementation embeds one of these to implement
/// [`room`](Client::room) and [`set_room`](Client::set_room).
#[derive(Debug, Default)]
pub struct RoomLink(Mutex<Weak<Room>>);

impl RoomLink {
    /// Creates an unlinked reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the linked room if it is still alive.
    pub fn get(&self) -> Option<Arc<Room>> {
        self.lock().upgrade()
    }

    /// Links to `room`, or unlinks with `None`.
    pub fn set(&self, room: Option<&Arc<Room>>) {
        *self.lock() = room.map(Arc::downgrade).unwrap_or_default();
    }

    /// Unlinks and returns the previously linked room.
    pub fn take(&self) -> Option<Arc<Room>> {
        std::mem::take(&mut *self.lock()).upgrade()
    }

    fn lock(&self) -> MutexGuard<'_, Weak<Room>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
