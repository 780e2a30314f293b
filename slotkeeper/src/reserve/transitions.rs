use super::types::{Reservation, ReserveExpired, ReserveStatus};

impl Reservation {
    /// Mark a reservation removed from storage by a commit.
    ///
    /// Only the caller that won the removal may call this, so the reservation is
    /// always `Active` here.
    pub fn commit(self) -> Reservation {
        debug_assert!(self.is_active(), "commit on {:?} reservation", self.status);
        Reservation {
            status: ReserveStatus::Committed,
            ..self
        }
    }

    /// Mark a reservation removed from storage by its timer and build the event announcing it.
    pub fn expire(self) -> (Reservation, ReserveExpired) {
        debug_assert!(self.is_active(), "expire on {:?} reservation", self.status);
        let event = ReserveExpired::from(&self);
        let reservation = Reservation {
            status: ReserveStatus::Expired,
            ..self
        };
        (reservation, event)
    }
}
