//! Integration tests for delayed actions.
//!
//! Uses a paused Tokio clock, so sleeps resolve as soon as every task is
//! idle and the tests never wait in real time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tavern_delay::DelayedActions;

// =========================================================================
// Helpers
// =========================================================================

fn counter() -> Arc<AtomicU32> {
    Arc::new(AtomicU32::new(0))
}

fn bump(hits: &Arc<AtomicU32>, by: u32) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
    let hits = Arc::clone(hits);
    move || {
        hits.fetch_add(by, Ordering::SeqCst);
        std::future::ready(())
    }
}

// =========================================================================
// schedule()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_runs_after_delay() {
    let delays = DelayedActions::new();
    let hits = counter();

    delays.schedule("turn", Duration::from_secs(2), bump(&hits, 1));
    assert!(delays.is_pending(&"turn"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0, "not yet");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(!delays.is_pending(&"turn"));
}

#[tokio::test(start_paused = true)]
async fn test_schedule_same_key_supersedes_previous() {
    let delays = DelayedActions::new();
    let hits = counter();

    delays.schedule("turn", Duration::from_secs(1), bump(&hits, 1));
    delays.schedule("turn", Duration::from_secs(3), bump(&hits, 10));
    assert_eq!(delays.pending_count(), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 10, "only the newer action runs");
}

#[tokio::test(start_paused = true)]
async fn test_schedule_different_keys_both_run() {
    let delays = DelayedActions::new();
    let hits = counter();

    delays.schedule(("room-1", 1), Duration::from_secs(1), bump(&hits, 1));
    delays.schedule(("room-1", 2), Duration::from_secs(1), bump(&hits, 1));

    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(hits.load(Ordering::SeqCst), 2);
    assert_eq!(delays.pending_count(), 0);
}

// =========================================================================
// cancel() / cancel_where()
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_prevents_action() {
    let delays = DelayedActions::new();
    let hits = counter();
    delays.schedule("turn", Duration::from_secs(1), bump(&hits, 1));

    assert!(delays.cancel(&"turn"));
    assert!(!delays.cancel(&"turn"), "nothing left to cancel");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_where_drops_only_matching_keys() {
    let delays = DelayedActions::new();
    let hits = counter();
    delays.schedule(("closed-room", 1), Duration::from_secs(1), bump(&hits, 1));
    delays.schedule(("closed-room", 2), Duration::from_secs(1), bump(&hits, 1));
    delays.schedule(("live-room", 1), Duration::from_secs(1), bump(&hits, 100));

    let cancelled = delays.cancel_where(|(room, _)| *room == "closed-room");

    assert_eq!(cancelled, 2);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(hits.load(Ordering::SeqCst), 100);
}

#[tokio::test(start_paused = true)]
async fn test_clone_shares_timers() {
    let delays = DelayedActions::new();
    let other = delays.clone();
    let hits = counter();

    delays.schedule("turn", Duration::from_secs(1), bump(&hits, 1));

    assert!(other.is_pending(&"turn"));
    assert!(other.cancel(&"turn"));
    assert_eq!(delays.pending_count(), 0);
}
