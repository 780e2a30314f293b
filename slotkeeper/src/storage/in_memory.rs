//! In-memory storage implementation for reservations.
//!
//! Reservations live in a `HashMap` behind a single `RwLock`. Everything is lost on restart.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::{Error, Result};
use crate::reserve::{Reservation, ReserveId};
use crate::timer::TimerHandle;

use super::{Removed, Storage};

/// Stored reservation with the timer that will expire it.
struct StoredReserve {
    reservation: Reservation,
    timer: Option<TimerHandle>,
}

/// In-memory implementation of the Storage trait.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    reserves: Arc<RwLock<HashMap<ReserveId, StoredReserve>>>,
}

impl InMemoryStorage {
    /// Create a new in-memory storage.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for InMemoryStorage {
    fn put(&self, reservation: Reservation) -> Result<()> {
        let mut reserves = self.reserves.write();

        match reserves.entry(reservation.reserve_id) {
            Entry::Occupied(_) => Err(Error::DuplicateKey {
                reserve_id: reservation.reserve_id,
            }),
            Entry::Vacant(slot) => {
                slot.insert(StoredReserve {
                    reservation,
                    timer: None,
                });
                Ok(())
            }
        }
    }

    fn arm(&self, id: &ReserveId, timer: TimerHandle) -> std::result::Result<(), TimerHandle> {
        let mut reserves = self.reserves.write();

        match reserves.get_mut(id) {
            Some(stored) => {
                stored.timer = Some(timer);
                Ok(())
            }
            None => Err(timer),
        }
    }

    fn get(&self, id: &ReserveId) -> Result<Reservation> {
        self.reserves
            .read()
            .get(id)
            .map(|stored| stored.reservation.clone())
            .ok_or(Error::NotFound { reserve_id: *id })
    }

    fn remove(&self, id: &ReserveId) -> Result<Removed> {
        self.reserves
            .write()
            .remove(id)
            .map(|stored| Removed {
                reservation: stored.reservation,
                timer: stored.timer,
            })
            .ok_or(Error::NotFound { reserve_id: *id })
    }

    fn list(&self) -> Vec<Reservation> {
        let mut snapshot: Vec<Reservation> = self
            .reserves
            .read()
            .values()
            .map(|stored| stored.reservation.clone())
            .collect();
        snapshot.sort_by_key(|reservation| reservation.created_at);
        snapshot
    }

    fn len(&self) -> usize {
        self.reserves.read().len()
    }
}
