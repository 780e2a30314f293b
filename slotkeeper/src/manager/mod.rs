//! Reservation manager.
//!
//! Composes storage, timers and the expiry notifier into the public reservation
//! operations. A reservation can leave the `Active` state from two independent
//! triggers, an explicit commit and its expiry timer. Both go through
//! [`Storage::remove`], and only the one that actually removes the entry acts on
//! it. Cancelling the timer on commit is an optimisation; a timer that fires
//! anyway finds nothing to remove and stays silent.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::stream::Stream;
use metrics::{counter, gauge};

use crate::errors::Result;
use crate::notifier::ExpiryNotifier;
use crate::reserve::{Reservation, ReserveExpired, ReserveId};
use crate::storage::in_memory::InMemoryStorage;
use crate::storage::{Removed, Storage};
use crate::timer::TimerService;

/// Entry point for creating, committing, listing and watching reservations.
///
/// Cloning is cheap and every clone operates on the same reservations.
///
/// # Example
/// ```ignore
/// let manager = ReserveManager::in_memory(Duration::from_secs(600), 1024);
///
/// let mut expired = manager.subscribe_expiry("c1");
/// let reservation = manager.create_reserve("c1".to_string(), 101, 1)?;
///
/// // Either confirm the hold...
/// let committed = manager.commit_reserve(&reservation.reserve_id)?;
/// // ...or let it lapse and receive a `ReserveExpired` on `expired`.
/// ```
pub struct ReserveManager<S: Storage = InMemoryStorage> {
    inner: Arc<Inner<S>>,
}

struct Inner<S> {
    storage: S,
    timers: TimerService,
    notifier: ExpiryNotifier,
    timeout: Duration,
}

impl<S: Storage> Clone for ReserveManager<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ReserveManager<InMemoryStorage> {
    /// Create a manager backed by in-memory storage.
    ///
    /// # Arguments
    /// * `timeout` - How long a reservation stays active without a commit
    /// * `notification_capacity` - Expiry events buffered per subscriber before it lags
    pub fn in_memory(timeout: Duration, notification_capacity: usize) -> Self {
        Self::new(InMemoryStorage::new(), ExpiryNotifier::new(notification_capacity), timeout)
    }
}

impl<S: Storage + 'static> ReserveManager<S> {
    pub fn new(storage: S, notifier: ExpiryNotifier, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                timers: TimerService::new(),
                notifier,
                timeout,
            }),
        }
    }

    /// The fixed lifetime of an uncommitted reservation.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Hold `quantity` of `activity_sp_id` until committed or until the timeout lapses.
    ///
    /// Neither the activity nor the quantity is validated. Must be called from within
    /// a tokio runtime, which drives the expiry timer.
    ///
    /// # Errors
    /// Only `DuplicateKey`, which indicates a broken ID generator.
    #[tracing::instrument(skip(self))]
    pub fn create_reserve(&self, context_id: String, activity_sp_id: i64, quantity: i64) -> Result<Reservation> {
        let inner = &self.inner;
        let reservation = Reservation::new(context_id, activity_sp_id, quantity, Utc::now(), inner.timeout);
        let reserve_id = reservation.reserve_id;

        inner.storage.put(reservation.clone())?;

        // The timer only holds a weak reference so pending timers don't keep a dropped manager alive.
        let weak: Weak<Inner<S>> = Arc::downgrade(inner);
        let timer = inner.timers.schedule(inner.timeout, move || {
            if let Some(inner) = weak.upgrade() {
                inner.expire(&reserve_id);
            }
        });

        if let Err(timer) = inner.storage.arm(&reserve_id, timer) {
            // Expired before the timer could be attached.
            inner.timers.cancel(timer);
        }

        counter!("slotkeeper_reserves_created_total").increment(1);
        inner.record_active();
        tracing::info!(
            reserve_id = %reserve_id,
            expires_at = %reservation.expires_at,
            "Reservation created"
        );

        Ok(reservation)
    }

    /// Confirm an active reservation, removing it before it can expire.
    ///
    /// Returns the reservation with all fields as created and status `Committed`.
    ///
    /// # Errors
    /// `NotFound` if there is nothing to commit: the ID is unknown, or the
    /// reservation was already committed or already expired.
    #[tracing::instrument(skip(self), fields(reserve_id = %reserve_id))]
    pub fn commit_reserve(&self, reserve_id: &ReserveId) -> Result<Reservation> {
        let inner = &self.inner;

        let Removed { reservation, timer } = match inner.storage.remove(reserve_id) {
            Ok(removed) => removed,
            Err(e) => {
                counter!("slotkeeper_commit_not_found_total").increment(1);
                tracing::debug!("Nothing to commit");
                return Err(e);
            }
        };

        if let Some(timer) = timer {
            inner.timers.cancel(timer);
        }

        let committed = reservation.commit();
        counter!("slotkeeper_reserves_committed_total").increment(1);
        inner.record_active();
        tracing::info!(context_id = %committed.context_id, "Reservation committed");

        Ok(committed)
    }

    /// Look up a single active reservation.
    ///
    /// # Errors
    /// `NotFound` if the reservation is not active.
    pub fn get_reserve(&self, reserve_id: &ReserveId) -> Result<Reservation> {
        self.inner.storage.get(reserve_id)
    }

    /// Snapshot of all currently active reservations, oldest first.
    pub fn list_reserves(&self) -> Vec<Reservation> {
        self.inner.storage.list()
    }

    /// Live stream of expiry events for `context_id`.
    ///
    /// Only events published after this call are delivered. There is no replay.
    pub fn subscribe_expiry<T: Into<String>>(
        &self,
        context_id: T,
    ) -> impl Stream<Item = ReserveExpired> + Send + 'static + use<S, T> {
        self.inner.notifier.subscribe(context_id)
    }

    /// Live stream of every expiry event.
    pub fn subscribe_all_expiries(&self) -> impl Stream<Item = ReserveExpired> + Send + 'static + use<S> {
        self.inner.notifier.subscribe_all()
    }
}

impl<S: Storage> Inner<S> {
    /// Timer callback for a reservation's timeout.
    fn expire(&self, reserve_id: &ReserveId) {
        let Ok(Removed { reservation, .. }) = self.storage.remove(reserve_id) else {
            // Committed first.
            tracing::trace!(reserve_id = %reserve_id, "Reservation no longer active, skipping expiry");
            return;
        };

        let (reservation, event) = reservation.expire();
        let subscribers = self.notifier.publish(event);

        counter!("slotkeeper_reserves_expired_total").increment(1);
        self.record_active();
        tracing::info!(
            reserve_id = %reserve_id,
            context_id = %reservation.context_id,
            subscribers,
            "Reservation expired"
        );
    }

    fn record_active(&self) {
        gauge!("slotkeeper_reserves_active").set(self.storage.len() as f64);
    }
}
