use serde::{Deserialize, Serialize};

/// Request payload for creating a reservation.
///
/// Every field is optional on the wire, missing or `null`; such values default to
/// an empty context and zero activity/quantity. Nothing is validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateReserve {
    /// Correlation token used to route the expiry notification
    pub context_id: Option<String>,
    /// Activity slot to hold
    pub activity_sp_id: Option<i64>,
    /// Amount to hold
    pub quantity: Option<i64>,
}

/// Query parameters for the expiry feed
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExpiredFeedQuery {
    /// Only expiries of reservations created with this context are streamed
    pub context_id: String,
}
