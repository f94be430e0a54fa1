//! HTTP handlers and the state they share.

pub mod event_handlers;
pub mod health_handlers;
pub mod record_handlers;

use crate::services::{metadata_store::SqliteMetadataStore, reconciler::Reconciler};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub reconciler: Reconciler,
    pub store: SqliteMetadataStore,
}
