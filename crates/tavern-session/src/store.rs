//! The session store: a TTL map from client identity to [`SessionData`].
//!
//! # Concurrency note
//!
//! The store is shared by every connection task (writers on disconnect,
//! readers on reconnect) and the sweeper, so it sits behind a single
//! `std::sync::Mutex`. The lock is only ever held for one map operation
//! and never across an `.await`, which keeps it cheap and lets the store
//! be used from synchronous room callbacks too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::Rng;
use tavern_protocol::{ClientId, RoomId};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{SessionConfig, SessionData, SessionError};

/// Holds the sessions of clients that dropped while in a room.
///
/// ## Lifecycle
///
/// ```text
/// store() ──→ [Stored] ──take_for_reconnect()──→ consumed
///                │
///                ▼ (older than ttl)
///           [Expired] ──purge_expired()──→ handed to the caller
/// ```
pub struct SessionStore {
    sessions: Mutex<HashMap<ClientId, SessionData>>,
    config: SessionConfig,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns the store's configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stamps `data.last_active` with the current time and inserts it,
    /// replacing any previous session for the same client.
    pub fn store(&self, mut data: SessionData) {
        data.last_active = Instant::now();
        let client_id = data.client_id.clone();
        let room_id = data.room_id.clone();
        self.lock().insert(client_id.clone(), data);
        tracing::info!(%client_id, %room_id, "session stored");
    }

    /// Returns a copy of the session, or `None` if there is none or it has
    /// outlived the TTL. Expired entries are left for the sweep.
    pub fn get(&self, client_id: &ClientId) -> Option<SessionData> {
        self.lock()
            .get(client_id)
            .filter(|session| !session.is_expired(self.config.ttl))
            .cloned()
    }

    /// Removes a session regardless of its age.
    pub fn remove(&self, client_id: &ClientId) -> Option<SessionData> {
        self.lock().remove(client_id)
    }

    /// Checks and consumes a session in one step.
    ///
    /// Succeeds only if a session exists for `client_id`, is within the
    /// TTL, carries `token`, and (when `expected_room` is given) belongs
    /// to that room. On success the session is removed, so a second call
    /// fails with [`SessionError::NotFound`].
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: nothing stored for this client
    /// - [`SessionError::Expired`]: stored, but older than the TTL
    /// - [`SessionError::OwnershipMismatch`]: wrong token or wrong room;
    ///   the session stays in place
    pub fn take_for_reconnect(
        &self,
        client_id: &ClientId,
        token: &str,
        expected_room: Option<&RoomId>,
    ) -> Result<SessionData, SessionError> {
        let mut sessions = self.lock();

        let session = sessions
            .get(client_id)
            .ok_or_else(|| SessionError::NotFound(client_id.clone()))?;

        if session.is_expired(self.config.ttl) {
            return Err(SessionError::Expired(client_id.clone()));
        }

        let room_matches = expected_room.is_none_or(|room| *room == session.room_id);
        if session.reconnect_token != token || !room_matches {
            tracing::warn!(%client_id, "reconnect attempt with mismatched ownership");
            return Err(SessionError::OwnershipMismatch(client_id.clone()));
        }

        sessions
            .remove(client_id)
            .ok_or_else(|| SessionError::NotFound(client_id.clone()))
    }

    /// Removes every session older than the TTL and returns them.
    pub fn purge_expired(&self) -> Vec<SessionData> {
        let ttl = self.config.ttl;
        let mut sessions = self.lock();

        let stale: Vec<ClientId> = sessions
            .iter()
            .filter(|(_, session)| session.is_expired(ttl))
            .map(|(id, _)| id.clone())
            .collect();

        let purged: Vec<SessionData> = stale
            .iter()
            .filter_map(|id| sessions.remove(id))
            .collect();
        drop(sessions);

        for session in &purged {
            tracing::info!(
                client_id = %session.client_id,
                room_id = %session.room_id,
                "session expired"
            );
        }
        purged
    }

    /// Spawns a task that runs [`purge_expired`](Self::purge_expired)
    /// every `sweep_interval` and passes each non-empty batch to
    /// `on_expired`.
    ///
    /// Abort the returned handle to stop the sweep.
    pub fn spawn_sweeper<F>(self: Arc<Self>, on_expired: F) -> JoinHandle<()>
    where
        F: Fn(Vec<SessionData>) + Send + 'static,
    {
        let period = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if !purged.is_empty() {
                    on_expired(purged);
                }
            }
        })
    }

    /// Returns the number of stored sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, SessionData>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

/// Generates a random 32-character hex string (128 bits of entropy).
///
/// Used as a reconnect token: a secret that only the server and one
/// client know.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionStore`.
    //!
    //! Time-dependent behavior runs on a paused Tokio clock
    //! (`start_paused = true`), and `time::advance` moves it forward
    //! instantly, so expiry tests are fast and deterministic.

    use std::time::Duration;

    use tavern_protocol::GameType;

    use super::*;

    // -- Helpers ----------------------------------------------------------

    const TTL: Duration = Duration::from_secs(60);

    fn store() -> SessionStore {
        SessionStore::new(SessionConfig::default().ttl(TTL))
    }

    fn session(client: &str, room: &str, token: &str) -> SessionData {
        SessionData::new(
            ClientId::from(client),
            RoomId::from(room),
            GameType::from("testGame"),
            token,
        )
    }

    // =====================================================================
    // store() / get() / remove()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_get_fresh_session_returns_it() {
        let store = store();
        store.store(session("p1", "r1", "tok"));

        let found = store.get(&ClientId::from("p1")).expect("stored");

        assert_eq!(found.room_id, RoomId::from("r1"));
        assert_eq!(found.reconnect_token, "tok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_expired_session_returns_none_but_keeps_entry() {
        let store = store();
        store.store(session("p1", "r1", "tok"));

        time::advance(TTL + Duration::from_secs(1)).await;

        assert!(store.get(&ClientId::from("p1")).is_none());
        assert_eq!(store.len(), 1, "expired entries wait for the sweep");
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_again_refreshes_timestamp() {
        let store = store();
        store.store(session("p1", "r1", "tok"));
        time::advance(TTL - Duration::from_secs(1)).await;

        store.store(session("p1", "r2", "tok2"));
        time::advance(Duration::from_secs(2)).await;

        let found = store.get(&ClientId::from("p1")).expect("refreshed");
        assert_eq!(found.room_id, RoomId::from("r2"));
    }

    #[test]
    fn test_remove_returns_entry_once() {
        let store = store();
        store.store(session("p1", "r1", "tok"));

        assert!(store.remove(&ClientId::from("p1")).is_some());
        assert!(store.remove(&ClientId::from("p1")).is_none());
        assert!(store.is_empty());
    }

    // =====================================================================
    // take_for_reconnect()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_take_for_reconnect_valid_consumes_session() {
        let store = store();
        store.store(session("p1", "r1", "tok"));
        let id = ClientId::from("p1");

        let taken = store
            .take_for_reconnect(&id, "tok", Some(&RoomId::from("r1")))
            .expect("valid reconnect");
        assert_eq!(taken.client_id, id);

        let again = store.take_for_reconnect(&id, "tok", None);
        assert!(matches!(again, Err(SessionError::NotFound(_))));
    }

    #[test]
    fn test_take_for_reconnect_unknown_client_returns_not_found() {
        let store = store();

        let result = store.take_for_reconnect(&ClientId::from("ghost"), "tok", None);

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_for_reconnect_after_ttl_returns_expired_before_sweep() {
        let store = store();
        store.store(session("p1", "r1", "tok"));

        time::advance(TTL + Duration::from_secs(1)).await;

        let result = store.take_for_reconnect(&ClientId::from("p1"), "tok", None);
        assert!(matches!(result, Err(SessionError::Expired(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_for_reconnect_wrong_token_leaves_session() {
        let store = store();
        store.store(session("p1", "r1", "tok"));
        let id = ClientId::from("p1");

        let result = store.take_for_reconnect(&id, "not-the-token", None);

        assert!(matches!(result, Err(SessionError::OwnershipMismatch(_))));
        assert!(store.get(&id).is_some(), "the real owner can still reconnect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_take_for_reconnect_wrong_room_returns_ownership_mismatch() {
        let store = store();
        store.store(session("p1", "r1", "tok"));

        let result =
            store.take_for_reconnect(&ClientId::from("p1"), "tok", Some(&RoomId::from("r9")));

        assert!(matches!(result, Err(SessionError::OwnershipMismatch(_))));
    }

    // =====================================================================
    // purge_expired() / spawn_sweeper()
    // =====================================================================

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired_removes_only_stale_sessions() {
        let store = store();
        store.store(session("old", "r1", "a"));
        time::advance(TTL).await;
        store.store(session("new", "r1", "b"));
        time::advance(Duration::from_secs(1)).await;

        let purged = store.purge_expired();

        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].client_id, ClientId::from("old"));
        assert!(store.get(&ClientId::from("new")).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_sweeper_hands_expired_batch_to_callback() {
        let store = Arc::new(SessionStore::new(
            SessionConfig::default()
                .ttl(TTL)
                .sweep_interval(Duration::from_secs(10)),
        ));
        store.store(session("p1", "r1", "tok"));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sweeper = Arc::clone(&store).spawn_sweeper(move |batch| {
            let _ = tx.send(batch);
        });

        let batch = rx.recv().await.expect("sweeper should report");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].client_id, ClientId::from("p1"));
        assert!(store.is_empty());

        sweeper.abort();
    }

    // =====================================================================
    // generate_token()
    // =====================================================================

    #[test]
    fn test_generate_token_is_32_hex_chars_and_unique() {
        let a = generate_token();
        let b = generate_token();

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
