//! Server configuration.

use std::time::Duration;

use serde::Deserialize;
use tavern_session::SessionConfig;
use tavern_transport::TransportConfig;

/// Everything needed to start a [`TavernServer`](crate::TavernServer).
///
/// Deserializable from JSON (or any serde format); absent fields take
/// their defaults:
///
/// ```rust
/// use tavern::ServerConfig;
///
/// let config: ServerConfig =
///     serde_json::from_str(r#"{ "bindAddr": "0.0.0.0:9000", "sessionTtlSecs": 60 }"#).unwrap();
/// assert_eq!(config.bind_addr, "0.0.0.0:9000");
/// assert_eq!(config.session_config().ttl.as_secs(), 60);
/// assert_eq!(config.max_frame_bytes, 64 * 1024);
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,
    /// Largest inbound frame accepted, in bytes.
    pub max_frame_bytes: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,
    /// Seconds between keepalive pings.
    pub ping_interval_secs: u64,
    /// Seconds without any inbound frame before a connection is dropped.
    pub pong_timeout_secs: u64,
    /// Seconds a dropped client has to reconnect.
    pub session_ttl_secs: u64,
    /// Seconds between expired-session sweeps.
    pub session_sweep_secs: u64,
    /// Seconds between empty-room cleanups.
    pub room_cleanup_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let transport = TransportConfig::default();
        let session = SessionConfig::default();
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            max_frame_bytes: transport.max_frame_bytes,
            outbound_capacity: transport.outbound_capacity,
            ping_interval_secs: transport.ping_interval.as_secs(),
            pong_timeout_secs: transport.pong_timeout.as_secs(),
            session_ttl_secs: session.ttl.as_secs(),
            session_sweep_secs: session.sweep_interval.as_secs(),
            room_cleanup_secs: 60,
        }
    }
}

impl ServerConfig {
    /// The transport limits this config describes.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::default()
            .max_frame_bytes(self.max_frame_bytes)
            .outbound_capacity(self.outbound_capacity)
            .ping_interval(Duration::from_secs(self.ping_interval_secs.max(1)))
            .pong_timeout(Duration::from_secs(self.pong_timeout_secs.max(1)))
    }

    /// The session retention this config describes.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::default()
            .ttl(Duration::from_secs(self.session_ttl_secs))
            .sweep_interval(Duration::from_secs(self.session_sweep_secs.max(1)))
    }

    /// How often empty rooms are reaped.
    pub fn room_cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.room_cleanup_secs.max(1))
    }
}
