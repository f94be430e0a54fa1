//! Data models for the read set metadata sync.
//!
//! `record` is the shape persisted in the metadata table, `source` mirrors
//! the sequence store API responses it is assembled from, and `event` holds
//! the queue messages that drive the reconciler.

pub mod event;
pub mod record;
pub mod source;
