//! Defines routes for the event endpoint and the record query API.
//!
//! ## Structure
//! - **Events**
//!   - `POST /events`: apply a queue batch of read set status changes
//!
//! - **Records**
//!   - `GET /records/{*id}`: one record by read set ARN
//!   - `GET /stores/{store_id}/records`: all records of a sequence store
//!
//! The wildcard `*id` lets ARNs such as
//! `arn:aws:omics:us-east-1:123:sequenceStore/1/readSet/2` through unescaped.

use crate::handlers::{
    AppState,
    event_handlers::receive_events,
    health_handlers::{healthz, readyz},
    record_handlers::{get_record, list_store_records},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build and return the router with all routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/events", post(receive_events))
        .route("/records/{*id}", get(get_record))
        .route("/stores/{store_id}/records", get(list_store_records))
}
