//! Session storage for Tavern.
//!
//! When a live connection drops while its client sits in a room, the
//! server writes a [`SessionData`] record here. The client then has
//! [`SessionConfig::ttl`] to come back with its reconnect token and take
//! its seat again:
//!
//! 1. **Store**: the disconnect path calls [`SessionStore::store`].
//! 2. **Reconnect**: [`SessionStore::take_for_reconnect`] checks the token
//!    and removes the record in one step, so a session is consumed once.
//! 3. **Expire**: a background sweep ([`SessionStore::spawn_sweeper`])
//!    purges records older than the TTL and hands them back so the room
//!    layer can release the seat.
//!
//! # How it fits in the stack
//!
//! ```text
//! Router (above)  ← stores on disconnect, consumes on reconnect
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← provides ClientId, RoomId, GameType
//! ```

mod error;
mod session;
mod store;

pub use error::SessionError;
pub use session::{SessionConfig, SessionData};
pub use store::{SessionStore, generate_token};
