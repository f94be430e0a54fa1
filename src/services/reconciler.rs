//! src/services/reconciler.rs
//!
//! Applies read set status-change events to the metadata table.
//!
//! The reconciler maps the status carried by an event straight onto a store
//! operation; it never compares against the stored status, so events may be
//! applied in any order and a later event corrects an earlier stale one.
//!
//! | status                               | operation             |
//! |--------------------------------------|-----------------------|
//! | `ACTIVE`                             | assemble, then upsert |
//! | `DELETED`                            | remove                |
//! | `ACTIVATING`, `ARCHIVED`, `DELETING` | status-only update    |
//! | anything else                        | nothing               |

use crate::{
    errors::SyncError,
    models::{
        event::{BatchItemFailure, BatchResponse, QueueBatch, StatusChangeEvent},
        record::ReadSetStatus,
    },
    services::{
        assembler::RecordAssembler,
        metadata_store::{MetadataStore, StatusUpdate},
    },
};
use std::{fmt, sync::Arc};
use tracing::{error, info, warn};

pub const NO_UPDATES_NEEDED: &str = "No updates needed";

/// What the reconciler did for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Full record written.
    Upserted,
    Removed,
    StatusUpdated(StatusUpdate),
    /// ACTIVE event for a read set that no longer exists.
    Skipped(String),
    /// Status with no store operation attached.
    NoUpdate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub arn: String,
    pub status: ReadSetStatus,
    pub action: ReconcileAction,
}

impl ReconcileOutcome {
    pub fn message(&self) -> String {
        match &self.action {
            ReconcileAction::Upserted => format!(
                "Set {} row created or fully updated for status {}",
                self.arn, self.status
            ),
            ReconcileAction::Removed => {
                format!("Set {} row deleted for status {}", self.arn, self.status)
            }
            ReconcileAction::StatusUpdated(StatusUpdate::Applied) => format!(
                "Set {} row status updated for status {}",
                self.arn, self.status
            ),
            ReconcileAction::StatusUpdated(StatusUpdate::Missing) => format!(
                "Set {} has no row; status {} not recorded",
                self.arn, self.status
            ),
            ReconcileAction::Skipped(reason) => {
                format!("Set {} skipped for status {}: {}", self.arn, self.status, reason)
            }
            ReconcileAction::NoUpdate => NO_UPDATES_NEEDED.to_string(),
        }
    }
}

/// A batch in which at least one message could not be applied.
#[derive(Debug)]
pub struct BatchError {
    pub total: usize,
    /// `(message id, error)` per failed message, in batch order.
    pub failures: Vec<(String, String)>,
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} messages failed", self.failures.len(), self.total)?;
        if let Some((message_id, error)) = self.failures.first() {
            write!(f, "; first failure on message `{}`: {}", message_id, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchError {}

#[derive(Clone)]
pub struct Reconciler {
    assembler: RecordAssembler,
    store: Arc<dyn MetadataStore>,
    /// Report failed messages individually instead of failing the batch.
    partial_batch_response: bool,
}

impl Reconciler {
    pub fn new(
        assembler: RecordAssembler,
        store: Arc<dyn MetadataStore>,
        partial_batch_response: bool,
    ) -> Self {
        Self {
            assembler,
            store,
            partial_batch_response,
        }
    }

    /// Apply a single event.
    pub async fn apply(&self, event: &StatusChangeEvent) -> Result<ReconcileOutcome, SyncError> {
        let action = match &event.status {
            ReadSetStatus::Active => {
                match self
                    .assembler
                    .assemble(&event.id, &event.sequence_store_id)
                    .await
                {
                    Ok(record) => {
                        self.store.upsert(&record).await?;
                        ReconcileAction::Upserted
                    }
                    Err(err) => {
                        let err = SyncError::from(err);
                        if !err.is_read_set_gone() {
                            return Err(err);
                        }
                        warn!(arn = %event.arn, "read set vanished before activation was synced");
                        ReconcileAction::Skipped(err.to_string())
                    }
                }
            }
            ReadSetStatus::Deleted => {
                self.store.remove(&event.arn).await?;
                ReconcileAction::Removed
            }
            ReadSetStatus::Activating | ReadSetStatus::Archived | ReadSetStatus::Deleting => {
                let update = self.store.update_status(&event.arn, &event.status).await?;
                ReconcileAction::StatusUpdated(update)
            }
            ReadSetStatus::Other(_) => ReconcileAction::NoUpdate,
        };

        Ok(ReconcileOutcome {
            arn: event.arn.clone(),
            status: event.status.clone(),
            action,
        })
    }

    /// Apply every message of a queue batch.
    ///
    /// Each message is processed regardless of how its siblings fared. With
    /// partial batch responses enabled, failed messages are listed in
    /// `batchItemFailures`; otherwise any failure fails the whole batch so
    /// the queue redelivers it.
    pub async fn handle_batch(&self, batch: &QueueBatch) -> Result<BatchResponse, BatchError> {
        let mut messages = Vec::with_capacity(batch.records.len());
        let mut failures = Vec::new();

        for message in &batch.records {
            let result = match message.event() {
                Ok(Some(event)) => self
                    .apply(&event)
                    .await
                    .map(|outcome| outcome.message())
                    .map_err(|err| err.to_string()),
                Ok(None) => Ok(NO_UPDATES_NEEDED.to_string()),
                Err(err) => Err(format!("undecodable message body: {}", err)),
            };

            match result {
                Ok(text) => {
                    info!(message_id = %message.message_id, "{}", text);
                    messages.push(text);
                }
                Err(err) => {
                    error!(message_id = %message.message_id, "Error processing message: {}", err);
                    failures.push((message.message_id.clone(), err));
                }
            }
        }

        if !failures.is_empty() && !self.partial_batch_response {
            return Err(BatchError {
                total: batch.records.len(),
                failures,
            });
        }

        Ok(BatchResponse {
            status_code: 200,
            body: messages.join("\n"),
            batch_item_failures: failures
                .into_iter()
                .map(|(item_identifier, _)| BatchItemFailure { item_identifier })
                .collect(),
        })
    }
}
