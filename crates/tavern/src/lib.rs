//! # Tavern
//!
//! A game-agnostic real-time multiplayer room server.
//!
//! Clients connect over WebSockets, create or join rooms, and exchange
//! JSON messages with a pluggable [`Game`](tavern_room::Game). Tavern
//! handles the plumbing: room lifecycle, broadcast, bots, and
//! reconnection after a dropped connection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tavern::prelude::*;
//!
//! # async fn start(my_game: Arc<dyn Game>) -> Result<(), TavernError> {
//! let server = TavernServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .game(my_game)
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Crates
//!
//! | crate              | layer                                    |
//! |--------------------|------------------------------------------|
//! | `tavern-transport` | WebSocket pumps, keepalive, backpressure |
//! | `tavern-protocol`  | envelopes, responses, ids, codec         |
//! | `tavern-session`   | reconnect sessions with a TTL            |
//! | `tavern-room`      | rooms, clients, games, registry          |
//! | `tavern-delay`     | cancellable delayed actions for games    |

mod config;
mod connection;
mod error;
mod handler;
mod router;
mod server;

pub use config::ServerConfig;
pub use connection::LiveClient;
pub use error::{RouteError, TavernError};
pub use router::Router;
pub use server::{TavernServer, TavernServerBuilder};

pub use tavern_delay as delay;
pub use tavern_protocol as protocol;
pub use tavern_room as room;
pub use tavern_session as session;
pub use tavern_transport as transport;

/// Everything a game server needs in one import.
pub mod prelude {
    pub use std::sync::Arc;

    pub use serde_json::{Value, json};
    pub use tavern_delay::DelayedActions;
    pub use tavern_protocol::{ClientId, Envelope, GameType, Response, RoomId, tags};
    pub use tavern_room::{
        BotClient, Client, ClientError, ClientRef, Game, GameError, GameRegistry, MockClient,
        Room, RoomDirectory, RoomError, RoomState,
    };
    pub use tavern_session::{SessionConfig, SessionStore};
    pub use tavern_transport::TransportConfig;

    pub use crate::{Router, RouteError, ServerConfig, TavernError, TavernServer};
}
