//! Reservation lifecycle types.
//!
//! States: `Active -> Committed` or `Active -> Expired`, both terminal.

pub mod transitions;
pub mod types;

pub use types::*;
