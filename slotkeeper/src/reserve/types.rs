//! Core types for reservations.
//!
//! A reservation is a provisional hold on `quantity` units of the activity slot
//! identified by `activity_sp_id`. It starts `Active` and leaves that state exactly
//! once, either by being committed or by expiring.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a reservation.
///
/// Freshly generated for every reservation and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReserveId(Uuid);

impl ReserveId {
    /// Create a new random reservation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReserveId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ReserveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for ReserveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReserveStatus {
    /// Held and waiting for a commit or for the timeout
    Active,
    /// Confirmed by the caller before the timeout
    Committed,
    /// Lapsed without a commit
    Expired,
}

/// A provisional hold on an activity slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub reserve_id: ReserveId,

    /// Caller-supplied correlation token, only used to route expiry notifications
    pub context_id: String,

    /// The activity slot being held. Not validated.
    pub activity_sp_id: i64,

    /// Amount held. Not checked against any capacity.
    pub quantity: i64,

    pub status: ReserveStatus,

    pub created_at: DateTime<Utc>,

    /// Always `created_at + timeout`
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a fresh `Active` reservation that lapses `timeout` after `now`.
    pub fn new(context_id: String, activity_sp_id: i64, quantity: i64, now: DateTime<Utc>, timeout: Duration) -> Self {
        // Timeouts beyond chrono's range saturate rather than wrap.
        let ttl = chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::MAX);
        Self {
            reserve_id: ReserveId::new(),
            context_id,
            activity_sp_id,
            quantity,
            status: ReserveStatus::Active,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ReserveStatus::Active
    }
}

/// Notification published when an uncommitted reservation lapses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveExpired {
    pub context_id: String,
    pub reserve_id: ReserveId,
    pub activity_sp_id: i64,
    pub quantity: i64,
    pub expired_at: DateTime<Utc>,
}

impl From<&Reservation> for ReserveExpired {
    fn from(reservation: &Reservation) -> Self {
        Self {
            context_id: reservation.context_id.clone(),
            reserve_id: reservation.reserve_id,
            activity_sp_id: reservation.activity_sp_id,
            quantity: reservation.quantity,
            expired_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reservation_is_active() {
        let now = Utc::now();
        let reservation = Reservation::new("c1".to_string(), 101, 1, now, Duration::from_secs(600));

        assert!(reservation.is_active());
        assert_eq!(reservation.created_at, now);
        assert_eq!(reservation.expires_at - reservation.created_at, chrono::Duration::minutes(10));
    }

    #[test]
    fn test_ids_are_unique() {
        let now = Utc::now();
        let a = Reservation::new("c1".to_string(), 101, 1, now, Duration::from_secs(1));
        let b = Reservation::new("c1".to_string(), 101, 1, now, Duration::from_secs(1));
        assert_ne!(a.reserve_id, b.reserve_id);
    }

    #[test]
    fn test_reserve_id_parses_its_display_form() {
        let id = ReserveId::new();
        let parsed: ReserveId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ReserveId>().is_err());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&ReserveStatus::Active).unwrap(), r#""active""#);
        assert_eq!(serde_json::to_string(&ReserveStatus::Committed).unwrap(), r#""committed""#);
    }

    #[test]
    fn test_huge_timeout_saturates() {
        let reservation = Reservation::new(String::new(), 0, 0, Utc::now(), Duration::MAX);
        assert_eq!(reservation.expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
