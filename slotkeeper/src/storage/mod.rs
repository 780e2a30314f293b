use crate::errors::Result;
use crate::reserve::{Reservation, ReserveId};
use crate::timer::TimerHandle;

pub mod in_memory;

/// A reservation removed from storage together with its pending timer, if one was armed.
#[derive(Debug)]
pub struct Removed {
    pub reservation: Reservation,
    pub timer: Option<TimerHandle>,
}

/// Storage for active reservations.
///
/// Only `Active` reservations are stored; leaving that state means being removed.
/// Every operation is atomic with respect to concurrent callers, and [`Storage::remove`]
/// is the single arbitration point between a commit and an expiry racing on the same ID.
pub trait Storage: Send + Sync {
    /// Insert a new active reservation.
    ///
    /// # Errors
    /// - `DuplicateKey` if a reservation with the same ID is already stored
    fn put(&self, reservation: Reservation) -> Result<()>;

    /// Attach the expiry timer to a stored reservation.
    ///
    /// If the reservation is no longer stored the timer is handed back to the caller.
    fn arm(&self, id: &ReserveId, timer: TimerHandle) -> std::result::Result<(), TimerHandle>;

    /// Look up an active reservation.
    ///
    /// # Errors
    /// - `NotFound` if the reservation was never created, or was committed or expired
    fn get(&self, id: &ReserveId) -> Result<Reservation>;

    /// Remove an active reservation, returning it with its timer.
    ///
    /// Of any number of concurrent callers removing the same ID, exactly one gets
    /// the entry; the rest get `NotFound`.
    fn remove(&self, id: &ReserveId) -> Result<Removed>;

    /// Snapshot of all active reservations, oldest first.
    fn list(&self) -> Vec<Reservation>;

    /// Number of active reservations.
    fn len(&self) -> usize;
}
