//! HTTP request handlers.
//!
//! - [`reserves`]: reservation lifecycle and expiry feed

pub mod reserves;
