//! src/services/enumerator.rs
//!
//! One-shot backfill of a sequence store into the metadata table.
//!
//! Pages through every read set of the store, assembles each record with a
//! container snapshot fetched once per run, and upserts it. A failure on one
//! read set is logged and counted without stopping the run; failures that
//! would hit every read set (authorization, configuration) and listing
//! failures abort it.

use crate::{
    errors::SyncError,
    models::record::ContainerInfo,
    services::{
        assembler::RecordAssembler, metadata_store::MetadataStore, source_client::MetadataSource,
    },
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_WRITE_DELAY_MS: u64 = 25;
pub const DEFAULT_WRITE_DELAY: Duration = Duration::from_millis(DEFAULT_WRITE_DELAY_MS);

#[derive(Clone, Debug)]
pub struct BackfillOptions {
    /// Read sets requested per listing call.
    pub page_size: usize,
    /// Pause before each read set, to stay under the source API rate limit.
    pub write_delay: Duration,
    /// Resume from this listing token instead of the first page.
    pub starting_token: Option<String>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            write_delay: DEFAULT_WRITE_DELAY,
            starting_token: None,
        }
    }
}

#[derive(Serialize, Clone, Debug)]
pub struct ItemFailure {
    pub read_set_id: String,
    pub error: String,
}

#[derive(Serialize, Clone, Debug)]
pub struct BackfillSummary {
    pub store_id: String,
    pub pages: usize,
    /// Read sets visited.
    pub processed: usize,
    /// Records upserted.
    pub written: usize,
    /// Read sets deleted between listing and lookup.
    pub skipped: usize,
    pub failed: usize,
    pub failures: Vec<ItemFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BackfillSummary {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

enum ItemOutcome {
    Written,
    Skipped,
}

pub struct Enumerator {
    source: Arc<dyn MetadataSource>,
    assembler: RecordAssembler,
    store: Arc<dyn MetadataStore>,
    options: BackfillOptions,
}

impl Enumerator {
    pub fn new(
        source: Arc<dyn MetadataSource>,
        store: Arc<dyn MetadataStore>,
        options: BackfillOptions,
    ) -> Self {
        Self {
            assembler: RecordAssembler::new(source.clone()),
            source,
            store,
            options,
        }
    }

    /// Backfill every read set of `store_id`.
    pub async fn run(&self, store_id: &str) -> Result<BackfillSummary, SyncError> {
        let page_size = self.options.page_size.max(1);
        let mut summary = BackfillSummary {
            store_id: store_id.to_string(),
            pages: 0,
            processed: 0,
            written: 0,
            skipped: 0,
            failed: 0,
            failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
        };
        let mut container: Option<ContainerInfo> = None;
        let mut next_token = self.options.starting_token.clone();

        loop {
            let page = self
                .source
                .list_read_sets(store_id, next_token.as_deref(), page_size)
                .await?;
            summary.pages += 1;

            if !page.read_sets.is_empty() && container.is_none() {
                container = Some(self.assembler.fetch_container(store_id).await?);
            }

            if let Some(container) = container.as_ref() {
                for read_set in &page.read_sets {
                    summary.processed += 1;
                    match self.sync_read_set(&read_set.id, container).await {
                        Ok(ItemOutcome::Written) => summary.written += 1,
                        Ok(ItemOutcome::Skipped) => summary.skipped += 1,
                        Err(err) if err.is_fatal() => {
                            error!(read_set_id = %read_set.id, "aborting backfill: {}", err);
                            return Err(err);
                        }
                        Err(err) => {
                            warn!(read_set_id = %read_set.id, "failed to sync read set: {}", err);
                            summary.failed += 1;
                            summary.failures.push(ItemFailure {
                                read_set_id: read_set.id.clone(),
                                error: err.to_string(),
                            });
                        }
                    }
                }
            }

            next_token = page.next_token;
            info!(
                store_id,
                processed = summary.processed,
                failed = summary.failed,
                next_token = next_token.as_deref().unwrap_or(""),
                "completed {} read sets",
                summary.processed
            );

            if next_token.is_none() {
                break;
            }
        }

        summary.finished_at = Utc::now();
        Ok(summary)
    }

    async fn sync_read_set(
        &self,
        read_set_id: &str,
        container: &ContainerInfo,
    ) -> Result<ItemOutcome, SyncError> {
        tokio::time::sleep(self.options.write_delay).await;

        let record = match self
            .assembler
            .assemble_with_container(read_set_id, container)
            .await
        {
            Ok(record) => record,
            Err(err) => {
                let err = SyncError::from(err);
                if err.is_read_set_gone() {
                    warn!(read_set_id, "read set disappeared before it could be synced");
                    return Ok(ItemOutcome::Skipped);
                }
                return Err(err);
            }
        };

        self.store.upsert(&record).await?;
        Ok(ItemOutcome::Written)
    }
}
