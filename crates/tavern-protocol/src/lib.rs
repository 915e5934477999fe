//! Wire protocol for Tavern.
//!
//! This crate defines the "language" that clients and the server speak:
//!
//! - **Identities** ([`ClientId`], [`RoomId`], [`GameType`]).
//! - **Framing** ([`Envelope`] inbound, [`Response`] outbound) and the
//!   reserved message [`tags`].
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the room
//! layer. It knows nothing about connections or rooms.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Router → Room / Game
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    ClientId, Envelope, GameType, ReconnectRequest, Response, RoomId, Welcome, tags,
};
