//! Session types: what the server remembers about a dropped connection.
//!
//! A session exists only between a live client's disconnect and either
//! its reconnect or its expiry. It records:
//! - WHO dropped (`client_id`)
//! - WHERE they were (`room_id`, `game_type`)
//! - HOW they prove it's them (`reconnect_token`)
//! - WHEN we last heard from them (`last_active`)

use std::time::Duration;

use serde_json::Value;
use tavern_protocol::{ClientId, GameType, RoomId};
use tokio::time::Instant;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Configuration for session retention.
///
/// ## Example
///
/// ```rust
/// use std::time::Duration;
/// use tavern_session::SessionConfig;
///
/// let config = SessionConfig::default().ttl(Duration::from_secs(60));
/// assert_eq!(config.ttl, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a dropped client has to reconnect before its seat is
    /// released.
    ///
    /// Default: 5 minutes.
    pub ttl: Duration,

    /// How often the background sweep purges expired sessions.
    ///
    /// Default: 30 seconds.
    pub sweep_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Sets the session time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the sweep interval.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

// ---------------------------------------------------------------------------
// SessionData
// ---------------------------------------------------------------------------

/// The record kept for a client that dropped while in a room.
#[derive(Debug, Clone)]
pub struct SessionData {
    /// The identity the client had before it dropped.
    pub client_id: ClientId,

    /// The room the client was sitting in.
    pub room_id: RoomId,

    /// The room's game type, kept so the seat can be released even if the
    /// room lookup later fails.
    pub game_type: GameType,

    /// When the session was stored. Uses Tokio's clock so tests can move
    /// time forward without sleeping.
    pub last_active: Instant,

    /// The secret the client must present to reclaim this session.
    pub reconnect_token: String,

    /// Free-form data a game or the router wants to carry across the gap.
    pub extra: Value,
}

impl SessionData {
    /// Creates a session record stamped with the current time.
    pub fn new(
        client_id: ClientId,
        room_id: RoomId,
        game_type: GameType,
        reconnect_token: impl Into<String>,
    ) -> Self {
        Self {
            client_id,
            room_id,
            game_type,
            last_active: Instant::now(),
            reconnect_token: reconnect_token.into(),
            extra: Value::Null,
        }
    }

    /// Attaches extra data to the record.
    pub fn with_extra(mut self, extra: Value) -> Self {
        self.extra = extra;
        self
    }

    /// Whether this record is older than `ttl`.
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.last_active.elapsed() > ttl
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn session() -> SessionData {
        SessionData::new(
            ClientId::from("p1"),
            RoomId::from("r1"),
            GameType::from("dice"),
            "tok",
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_expired_only_after_ttl() {
        let data = session();
        let ttl = Duration::from_secs(10);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!data.is_expired(ttl), "exactly ttl is still valid");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(data.is_expired(ttl));
    }

    #[test]
    fn test_with_extra_carries_payload() {
        let data = session().with_extra(json!({ "seat": 2 }));

        assert_eq!(data.extra["seat"], 2);
        assert_eq!(data.reconnect_token, "tok");
    }

    #[test]
    fn test_config_setters_override_defaults() {
        let config = SessionConfig::default()
            .ttl(Duration::from_secs(1))
            .sweep_interval(Duration::from_secs(2));

        assert_eq!(config.ttl, Duration::from_secs(1));
        assert_eq!(config.sweep_interval, Duration::from_secs(2));
    }
}
