//! `TavernServer` builder and server loop.
//!
//! This is the entry point for running a Tavern server. It ties together
//! all the layers: transport → protocol → router → rooms and games, plus
//! the two background sweeps (expired sessions, empty rooms).

use std::net::SocketAddr;
use std::sync::Arc;

use tavern_room::{Game, GameRegistry};
use tavern_session::SessionStore;
use tavern_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{Router, ServerConfig, TavernError};

/// Builder for configuring and starting a Tavern server.
///
/// # Example
///
/// ```rust,ignore
/// use tavern::prelude::*;
///
/// let server = TavernServer::builder()
///     .bind("0.0.0.0:8080")
///     .game(Arc::new(MyGame))
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct TavernServerBuilder {
    config: ServerConfig,
    games: Vec<Arc<dyn Game>>,
}

impl TavernServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            games: Vec::new(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers a game. Later registrations of the same type win.
    pub fn game(mut self, game: Arc<dyn Game>) -> Self {
        self.games.push(game);
        self
    }

    /// Binds the listener and assembles the server.
    pub async fn build(self) -> Result<TavernServer, TavernError> {
        let transport =
            WebSocketTransport::bind(&self.config.bind_addr, self.config.transport_config()).await?;

        let registry = Arc::new(GameRegistry::new());
        for game in self.games {
            registry.register_game(game);
        }
        let sessions = Arc::new(SessionStore::new(self.config.session_config()));
        let router = Arc::new(Router::new(registry, sessions));

        Ok(TavernServer {
            transport,
            router,
            config: self.config,
        })
    }
}

impl Default for TavernServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Tavern server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct TavernServer {
    transport: WebSocketTransport,
    router: Arc<Router>,
    config: ServerConfig,
}

impl TavernServer {
    /// Creates a new builder.
    pub fn builder() -> TavernServerBuilder {
        TavernServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TavernError> {
        Ok(self.transport.local_addr()?)
    }

    /// The router shared by every connection.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// The configuration the server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs the server.
    ///
    /// Starts the session sweeper and the room cleanup loop, then accepts
    /// connections forever, one task per connection.
    pub async fn run(mut self) -> Result<(), TavernError> {
        let sweep_router = Arc::clone(&self.router);
        let _sweeper = Arc::clone(self.router.sessions()).spawn_sweeper(move |expired| {
            sweep_router.release_sessions(expired);
        });
        let _cleanup = Arc::clone(self.router.directory())
            .spawn_cleanup(self.config.room_cleanup_interval());

        tracing::info!(
            addr = %self.config.bind_addr,
            games = ?self.router.registry().game_types(),
            "Tavern server running"
        );

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let router = Arc::clone(&self.router);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, router).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}
