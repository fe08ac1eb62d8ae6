//! Idempotency cache for mutating requests.
//!
//! The first caller presenting a key reserves it and runs the operation.
//! Concurrent callers with the same key wait on a [`tokio::sync::watch`]
//! channel for that result instead of running the operation themselves.
//! Completed results are replayed verbatim until they expire.
//!
//! Operations run on a detached task (see [`IdempotencyCache::execute`]): if
//! the request that started one is dropped, the mutation still finishes and
//! its result still lands in the cache for the retry to pick up.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;

use super::Clock;
use crate::error::LedgerError;

/// Result of an operation as stored in the cache.
pub type Outcome<T> = Result<T, LedgerError>;

#[derive(Debug)]
enum Slot<T> {
    InFlight(watch::Receiver<Option<Outcome<T>>>),
    Done {
        outcome: Outcome<T>,
        expires_at: DateTime<Utc>,
    },
}

type SlotMap<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

fn lock_slots<T>(slots: &Mutex<HashMap<String, Slot<T>>>) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Keyed store of operation outcomes.
///
/// Cloning is cheap; clones share the same entries.
#[derive(Debug)]
pub struct IdempotencyCache<T> {
    slots: SlotMap<T>,
    clock: Arc<dyn Clock>,
    retention: TimeDelta,
}

impl<T> Clone for IdempotencyCache<T> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            clock: Arc::clone(&self.clock),
            retention: self.retention,
        }
    }
}

/// What [`IdempotencyCache::begin`] found for a key.
#[derive(Debug)]
pub enum Begin<T> {
    /// The key was free; the holder must run the operation and complete it.
    New(Reservation<T>),
    /// The key already has a result, which must be returned as is.
    Cached(Outcome<T>),
}

/// Exclusive claim on a key.
///
/// Dropping it without calling [`Reservation::complete`] frees the key so a
/// waiting or retrying caller can run the operation instead.
#[derive(Debug)]
pub struct Reservation<T> {
    slots: SlotMap<T>,
    key: String,
    sender: watch::Sender<Option<Outcome<T>>>,
    expires_at: DateTime<Utc>,
    completed: bool,
}

impl<T: Clone> Reservation<T> {
    /// Records the outcome and wakes every waiter.
    ///
    /// Transient failures are handed to current waiters but not kept, so a
    /// later retry with the same key runs the operation again.
    pub fn complete(mut self, outcome: &Outcome<T>) {
        {
            let mut slots = lock_slots(&self.slots);
            match outcome {
                Err(e) if e.is_transient() => {
                    slots.remove(&self.key);
                }
                _ => {
                    slots.insert(
                        self.key.clone(),
                        Slot::Done {
                            outcome: outcome.clone(),
                            expires_at: self.expires_at,
                        },
                    );
                }
            }
        }
        self.completed = true;
        self.sender.send_replace(Some(outcome.clone()));
    }
}

impl<T> Drop for Reservation<T> {
    fn drop(&mut self) {
        if !self.completed {
            lock_slots(&self.slots).remove(&self.key);
        }
    }
}

impl<T> IdempotencyCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a cache keeping results for `retention`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, retention: TimeDelta) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            clock,
            retention,
        }
    }

    /// How long completed results are kept.
    #[must_use]
    pub fn retention(&self) -> TimeDelta {
        self.retention
    }

    /// Reserves `key`, or returns the result stored under it.
    ///
    /// If another caller holds the reservation, waits until it completes.
    pub async fn begin(&self, key: &str) -> Begin<T> {
        loop {
            let mut rx = {
                let mut slots = lock_slots(&self.slots);
                let now = self.clock.now();
                match slots.get(key) {
                    Some(Slot::Done {
                        outcome,
                        expires_at,
                    }) if *expires_at > now => return Begin::Cached(outcome.clone()),
                    Some(Slot::InFlight(rx)) => rx.clone(),
                    _ => {
                        let (sender, rx) = watch::channel(None);
                        slots.insert(key.to_string(), Slot::InFlight(rx));
                        return Begin::New(Reservation {
                            slots: Arc::clone(&self.slots),
                            key: key.to_string(),
                            sender,
                            expires_at: now + self.retention,
                            completed: false,
                        });
                    }
                }
            };

            tracing::debug!(key, "waiting for in-flight request with same idempotency key");
            if let Ok(value) = rx.wait_for(Option::is_some).await
                && let Some(outcome) = (*value).clone()
            {
                return Begin::Cached(outcome);
            }
            // The holder went away without a result; compete for the key again.
        }
    }

    /// Runs `op` at most once per live key, on a detached task.
    ///
    /// Without a key the operation still runs detached but is not cached.
    ///
    /// # Errors
    ///
    /// Returns whatever `op` returned (possibly a replayed error), or
    /// [`LedgerError::Internal`] if the task panicked.
    pub async fn execute<F, Fut>(&self, key: Option<String>, op: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Outcome<T>> + Send + 'static,
    {
        let reservation = match key {
            Some(key) => match self.begin(&key).await {
                Begin::Cached(outcome) => {
                    tracing::debug!(key, "replaying cached result");
                    return outcome;
                }
                Begin::New(reservation) => Some(reservation),
            },
            None => None,
        };

        let task = tokio::spawn(async move {
            let outcome = op().await;
            if let Some(reservation) = reservation {
                reservation.complete(&outcome);
            }
            outcome
        });

        task.await
            .map_err(|e| LedgerError::Internal(format!("operation task failed: {e}")))?
    }

    /// Drops every completed entry whose retention has elapsed.
    ///
    /// In-flight reservations are never evicted. Returns how many entries
    /// were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut slots = lock_slots(&self.slots);
        let before = slots.len();
        slots.retain(|_, slot| match slot {
            Slot::InFlight(_) => true,
            Slot::Done { expires_at, .. } => *expires_at > now,
        });
        before - slots.len()
    }

    /// Number of keys currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }

    /// Returns `true` if no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock_slots(&self.slots).is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::domain::ManualClock;

    fn cache(clock: &Arc<ManualClock>) -> IdempotencyCache<u64> {
        let clock: Arc<dyn Clock> = Arc::clone(clock) as Arc<dyn Clock>;
        IdempotencyCache::new(clock, TimeDelta::hours(24))
    }

    #[tokio::test]
    async fn second_begin_returns_cached_result() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);

        let Begin::New(reservation) = cache.begin("k").await else {
            panic!("first begin should reserve");
        };
        reservation.complete(&Ok(7));

        let Begin::Cached(outcome) = cache.begin("k").await else {
            panic!("second begin should hit the cache");
        };
        assert_eq!(outcome, Ok(7));
    }

    #[tokio::test]
    async fn deterministic_errors_are_cached_transient_ones_are_not() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);

        let Begin::New(r) = cache.begin("bad").await else {
            panic!("reserve");
        };
        r.complete(&Err(LedgerError::SameAccount));
        assert!(matches!(
            cache.begin("bad").await,
            Begin::Cached(Err(LedgerError::SameAccount))
        ));

        let Begin::New(r) = cache.begin("flaky").await else {
            panic!("reserve");
        };
        r.complete(&Err(LedgerError::Conflict("busy".to_string())));
        assert!(matches!(cache.begin("flaky").await, Begin::New(_)));
    }

    #[tokio::test]
    async fn dropped_reservation_frees_the_key() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        {
            let Begin::New(_r) = cache.begin("k").await else {
                panic!("reserve");
            };
        }
        assert!(cache.is_empty());
        assert!(matches!(cache.begin("k").await, Begin::New(_)));
    }

    #[tokio::test]
    async fn concurrent_execute_runs_operation_once() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let runs = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let runs = Arc::clone(&runs);
            handles.push(tokio::spawn(async move {
                cache
                    .execute(Some("same".to_string()), move || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(runs.fetch_add(1, Ordering::SeqCst) as u64 + 100)
                    })
                    .await
            }));
        }

        for handle in handles {
            let Ok(outcome) = handle.await else {
                panic!("join failed");
            };
            assert_eq!(outcome, Ok(100));
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_caller_does_not_cancel_operation() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let runs = Arc::new(AtomicUsize::new(0));

        let op_runs = Arc::clone(&runs);
        let first = tokio::time::timeout(
            Duration::from_millis(5),
            cache.execute(Some("slow".to_string()), move || async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                op_runs.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }),
        )
        .await;
        assert!(first.is_err(), "caller should have timed out");

        // The retry waits for the detached original and receives its result.
        let retry_runs = Arc::clone(&runs);
        let retry = cache
            .execute(Some("slow".to_string()), move || async move {
                retry_runs.fetch_add(1, Ordering::SeqCst);
                Ok(2)
            })
            .await;
        assert_eq!(retry, Ok(1));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_and_key_reusable() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let _ = cache.execute(Some("k".to_string()), || async { Ok(1) }).await;
        assert_eq!(cache.evict_expired(), 0);

        clock.advance(TimeDelta::hours(24));
        assert!(matches!(cache.begin("k").await, Begin::New(_)));

        let _ = cache.execute(Some("k2".to_string()), || async { Ok(1) }).await;
        clock.advance(TimeDelta::hours(25));
        assert_eq!(cache.evict_expired(), 1);
    }

    #[tokio::test]
    async fn eviction_skips_in_flight_reservations() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let Begin::New(_held) = cache.begin("pending").await else {
            panic!("reserve");
        };
        clock.advance(TimeDelta::days(7));
        assert_eq!(cache.evict_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn keyless_execute_is_not_cached() {
        let clock = Arc::new(ManualClock::default());
        let cache = cache(&clock);
        let out = cache.execute(None, || async { Ok(3) }).await;
        assert_eq!(out, Ok(3));
        assert!(cache.is_empty());
    }
}
