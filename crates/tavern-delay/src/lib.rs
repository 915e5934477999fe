//! Delayed actions for turn-based games.
//!
//! Games often want "do X in two seconds" (end a turn, let a bot think,
//! expire a prompt). The hazard is the stale timer: by the time it fires,
//! the turn it belonged to is over or the room is gone. [`DelayedActions`]
//! keys every timer, and:
//!
//! - scheduling again under a key replaces the previous timer
//! - [`cancel`](DelayedActions::cancel) and
//!   [`cancel_where`](DelayedActions::cancel_where) drop timers before they
//!   fire
//! - a generation number checked under the lock guarantees a superseded or
//!   cancelled timer never runs its action, even if it already woke up
//!
//! Once an action has started it can no longer be cancelled, so callbacks
//! that touch a room should still expect the room to have closed.
//!
//! # Integration
//!
//! ```ignore
//! let delays = DelayedActions::new();
//! delays.schedule((room_id.clone(), player_id), Duration::from_secs(2), move || async move {
//!     if room.update_state(|s: &mut Race| s.end_turn()).is_err() {
//!         return; // room closed meanwhile
//!     }
//!     room.broadcast(&turn_over, &[]);
//! });
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

struct Pending {
    generation: u64,
    handle: JoinHandle<()>,
}

type PendingMap<K> = HashMap<K, Pending>;

/// A set of keyed, cancellable timers.
///
/// Cheap to clone; clones share the same timers.
pub struct DelayedActions<K> {
    pending: Arc<Mutex<PendingMap<K>>>,
    next_generation: Arc<AtomicU64>,
}

impl<K> Clone for DelayedActions<K> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_generation: Arc::clone(&self.next_generation),
        }
    }
}

impl<K> Default for DelayedActions<K> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<K> DelayedActions<K>
where
    K: Hash + Eq + Clone + Send + 'static,
{
    /// Creates an empty set of timers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `action` after `delay`, replacing any timer already scheduled
    /// under `key`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        // Hold the lock across the spawn so the task can't look for its
        // entry before it is inserted.
        let mut map = lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut map = lock(&pending);
                match map.get(&task_key) {
                    Some(entry) if entry.generation == generation => {
                        map.remove(&task_key);
                    }
                    _ => {
                        trace!(generation, "delayed action superseded");
                        return;
                    }
                }
            }
            action().await;
        });

        if let Some(previous) = map.insert(key, Pending { generation, handle }) {
            previous.handle.abort();
            trace!(generation = previous.generation, "replaced pending delayed action");
        }
    }

    /// Cancels the timer under `key`. Returns `true` if one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(entry) => {
                entry.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every timer whose key matches `predicate`, e.g. everything
    /// belonging to a room that just closed. Returns how many were
    /// cancelled.
    pub fn cancel_where(&self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let mut map = lock(&self.pending);
        let doomed: Vec<K> = map.keys().filter(|k| predicate(k)).cloned().collect();
        for key in &doomed {
            if let Some(entry) = map.remove(key) {
                entry.handle.abort();
            }
        }
        doomed.len()
    }

    /// Whether a timer is waiting under `key`.
    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.pending).contains_key(key)
    }

    /// Number of timers still waiting.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

fn lock<K>(pending: &Mutex<PendingMap<K>>) -> MutexGuard<'_, PendingMap<K>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
