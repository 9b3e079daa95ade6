// In-flight dedup map: at most one computation per cache key.
//
// The first caller for a key gets a `SlotGuard` and does the work. Everyone
// else gets a `SlotWaiter` subscribed to the guard's watch channel and reuses
// whatever the guard publishes. The map is sharded (DashMap), so unrelated
// keys never contend on one lock.
//
// The guard removes its map entry on drop, whatever the exit path: success,
// error, panic, or the owning future being cancelled. Dropping the guard also
// drops the channel's sender, which wakes any waiter still pending so it can
// try again instead of hanging.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::ModerationError;
use crate::verdict::Verdict;

/// `None` while the computation is still running.
type Outcome = Option<Result<Verdict, ModerationError>>;

type Slots = DashMap<String, Arc<watch::Sender<Outcome>>>;

/// Result of trying to claim a key.
pub enum ComputeSlot {
    /// This caller owns the computation.
    Exclusive(SlotGuard),
    /// Someone else is already computing; wait for their result.
    InFlight(SlotWaiter),
}

#[derive(Clone, Default)]
pub struct InFlightMap {
    slots: Arc<Slots>,
}

impl InFlightMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`, or subscribe to the computation that already holds it.
    pub fn acquire(&self, key: &str) -> ComputeSlot {
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(occupied) => ComputeSlot::InFlight(SlotWaiter {
                rx: occupied.get().subscribe(),
            }),
            Entry::Vacant(vacant) => {
                let (tx, _rx) = watch::channel(None);
                let tx = Arc::new(tx);
                vacant.insert(Arc::clone(&tx));
                ComputeSlot::Exclusive(SlotGuard {
                    slots: Arc::clone(&self.slots),
                    key: key.to_string(),
                    tx,
                })
            }
        }
    }

    /// Keys currently being computed.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Exclusive right to compute one key. Releases the key on drop.
pub struct SlotGuard {
    slots: Arc<Slots>,
    key: String,
    tx: Arc<watch::Sender<Outcome>>,
}

impl SlotGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Hand the outcome to every current and future waiter on this slot.
    pub fn publish(&self, outcome: Result<Verdict, ModerationError>) {
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        // Only remove our own entry; a later guard may have re-claimed the key.
        self.slots
            .remove_if(&self.key, |_, tx| Arc::ptr_eq(tx, &self.tx));
    }
}

/// How a wait on someone else's computation ended.
#[derive(Debug)]
pub enum WaitOutcome {
    /// The leader published a result (which may itself be an error).
    Ready(Result<Verdict, ModerationError>),
    /// The leader went away without publishing; the key is free again.
    Abandoned,
    /// The deadline passed first.
    TimedOut,
}

pub struct SlotWaiter {
    rx: watch::Receiver<Outcome>,
}

impl SlotWaiter {
    /// Wait for the leader's outcome until `deadline`.
    pub async fn wait_until(mut self, deadline: Instant) -> WaitOutcome {
        let waited = tokio::time::timeout_at(deadline, self.rx.wait_for(|o| o.is_some())).await;
        match waited {
            Err(_) => WaitOutcome::TimedOut,
            Ok(Err(_)) => WaitOutcome::Abandoned,
            Ok(Ok(outcome)) => match &*outcome {
                Some(result) => WaitOutcome::Ready(result.clone()),
                None => WaitOutcome::Abandoned,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    #[test]
    fn test_second_acquire_is_in_flight() {
        let map = InFlightMap::new();
        let first = map.acquire("k");
        assert!(matches!(first, ComputeSlot::Exclusive(_)));
        assert!(matches!(map.acquire("k"), ComputeSlot::InFlight(_)));
        assert!(matches!(map.acquire("other"), ComputeSlot::Exclusive(_)));
    }

    #[test]
    fn test_drop_releases_key() {
        let map = InFlightMap::new();
        {
            let _guard = map.acquire("k");
            assert_eq!(map.len(), 1);
        }
        assert!(map.is_empty());
        assert!(matches!(map.acquire("k"), ComputeSlot::Exclusive(_)));
    }

    #[tokio::test]
    async fn test_waiter_receives_published_error() {
        let map = InFlightMap::new();
        let ComputeSlot::Exclusive(guard) = map.acquire("k") else {
            panic!("expected exclusive");
        };
        let ComputeSlot::InFlight(waiter) = map.acquire("k") else {
            panic!("expected in-flight");
        };

        let handle = tokio::spawn(waiter.wait_until(deadline()));
        guard.publish(Err(ModerationError::Analysis));
        drop(guard);

        match handle.await.unwrap() {
            WaitOutcome::Ready(Err(ModerationError::Analysis)) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_guard_wakes_waiter_as_abandoned() {
        let map = InFlightMap::new();
        let guard = map.acquire("k");
        let ComputeSlot::InFlight(waiter) = map.acquire("k") else {
            panic!("expected in-flight");
        };
        let handle = tokio::spawn(waiter.wait_until(deadline()));
        drop(guard);
        assert!(matches!(handle.await.unwrap(), WaitOutcome::Abandoned));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_times_out() {
        let map = InFlightMap::new();
        let _guard = map.acquire("k");
        let ComputeSlot::InFlight(waiter) = map.acquire("k") else {
            panic!("expected in-flight");
        };
        let outcome = waiter
            .wait_until(Instant::now() + Duration::from_millis(50))
            .await;
        assert!(matches!(outcome, WaitOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_cancelled_leader_releases_slot() {
        let map = InFlightMap::new();
        let leader_map = map.clone();
        let leader = tokio::spawn(async move {
            let _slot = leader_map.acquire("k");
            std::future::pending::<()>().await;
        });
        tokio::task::yield_now().await;
        while map.is_empty() {
            tokio::task::yield_now().await;
        }
        leader.abort();
        let _ = leader.await;
        assert!(map.is_empty());
    }
}
