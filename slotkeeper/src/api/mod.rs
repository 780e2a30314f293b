//! HTTP API for reservations.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response payloads
//!
//! # Routes
//!
//! - `POST /api/v1/reserves` - create a reservation
//! - `GET /api/v1/reserves` - list active reservations
//! - `GET /api/v1/reserves/{reserve_id}` - fetch one active reservation
//! - `POST /api/v1/reserves/{reserve_id}/commit` - commit a reservation
//! - `GET /api/v1/reserves/expired?context_id=..` - Server-Sent Events feed of expiries

pub mod handlers;
pub mod models;
