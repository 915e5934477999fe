//! Rooms, clients and game dispatch for Tavern.
//!
//! A room is a shared object guarded by its own mutex: members, one opaque
//! game state value, and a closed flag. Any task can call into it; nothing
//! holds two room locks at once, and fan-out happens after the lock is
//! released.
//!
//! # Key types
//!
//! - [`Client`]: anything a room can deliver to (live connection, bot, mock)
//! - [`Room`]: membership, broadcast and the typed state container
//! - [`Game`]: the trait game developers implement
//! - [`GameRegistry`]: game-type tag → [`Game`] dispatch
//! - [`RoomDirectory`]: creates, finds and reaps rooms

mod bot;
mod client;
mod directory;
mod error;
mod game;
mod mock;
mod registry;
mod room;

pub use bot::{BotClient, BotReaction};
pub use client::{Client, ClientRef, RoomLink};
pub use directory::RoomDirectory;
pub use error::{ClientError, GameError, RoomError};
pub use game::{Game, RoomState};
pub use mock::MockClient;
pub use registry::GameRegistry;
pub use room::Room;
