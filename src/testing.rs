//! In-process fakes and fixtures shared by the unit tests.

use crate::{
    models::{
        record::{ContainerInfo, FileEntry, MetadataRecord, ReadSetStatus, SEQUENCE_STORE_KIND},
        source::{
            FileInformation, FileS3Access, ReadSetMetadata, ReadSetPage, ReadSetSummary,
            SequenceStore, SequenceStoreS3Access,
        },
    },
    services::{
        metadata_store::{MetadataStore, SqliteMetadataStore, StatusUpdate, StoreResult},
        retry::RetryPolicy,
        source_client::{MetadataSource, SourceError, SourceResult},
    },
};
use async_trait::async_trait;
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
};

pub fn arn_for(read_set_id: &str, store_id: &str) -> String {
    format!(
        "arn:aws:omics:us-east-1:123456789012:sequenceStore/{}/readSet/{}",
        store_id, read_set_id
    )
}

pub fn store_arn_for(store_id: &str) -> String {
    format!("arn:aws:omics:us-east-1:123456789012:sequenceStore/{}", store_id)
}

/// A single-connection in-memory database; every pool is its own database.
pub async fn memory_pool() -> Arc<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    Arc::new(pool)
}

pub async fn memory_store() -> SqliteMetadataStore {
    let store = SqliteMetadataStore::new(memory_pool().await, "set_metadata", RetryPolicy::none())
        .expect("valid table name");
    store.migrate().await.expect("migrate");
    store
}

pub fn container_for(store_id: &str) -> ContainerInfo {
    ContainerInfo {
        id: store_id.to_string(),
        arn: store_arn_for(store_id),
        kind: SEQUENCE_STORE_KIND.to_string(),
        name: Some(format!("{} name", store_id)),
        access_point_arn: Some(format!("arn:aws:s3:us-east-1:123456789012:accesspoint/{}", store_id)),
        uri: Some(format!("s3://{}-ap/{}/", store_id, store_id)),
    }
}

/// A fully populated record, as the assembler would produce it.
pub fn record_for(read_set_id: &str, store_id: &str) -> MetadataRecord {
    MetadataRecord {
        id: arn_for(read_set_id, store_id),
        object_id: Some(read_set_id.to_string()),
        file_type: Some("FASTQ".into()),
        name: Some(format!("{} name", read_set_id)),
        description: Some("paired reads".into()),
        reference_id: None,
        sample_id: Some("sample-1".into()),
        subject_id: Some("subject-1".into()),
        status: ReadSetStatus::Active,
        tags: Some(BTreeMap::from([("project".to_string(), "alpha".to_string())])),
        files: vec![
            FileEntry {
                path: format!("s3://{}-ap/{}/{}/r1.fastq.gz", store_id, store_id, read_set_id),
                checksum: "etag-1".into(),
                role: "source1".into(),
                byte_length: 1024,
                part_size: Some(512),
                part_count: Some(2),
            },
            FileEntry {
                path: format!("s3://{}-ap/{}/{}/r2.fastq.gz", store_id, store_id, read_set_id),
                checksum: "etag-2".into(),
                role: "source2".into(),
                byte_length: 2048,
                part_size: None,
                part_count: None,
            },
        ],
        container: container_for(store_id),
    }
}

pub fn read_set_metadata(read_set_id: &str, store_id: &str) -> ReadSetMetadata {
    let file = |name: &str, length: u64| FileInformation {
        total_parts: Some(2),
        part_size: Some(length / 2),
        content_length: Some(length),
        s3_access: Some(FileS3Access {
            s3_uri: Some(format!("s3://{}-ap/{}/{}/{}", store_id, store_id, read_set_id, name)),
        }),
    };

    ReadSetMetadata {
        id: read_set_id.to_string(),
        arn: arn_for(read_set_id, store_id),
        subject_id: Some("subject-1".into()),
        sample_id: Some("sample-1".into()),
        status: "ACTIVE".into(),
        name: Some(format!("{} name", read_set_id)),
        description: None,
        file_type: Some("FASTQ".into()),
        reference_arn: None,
        files: BTreeMap::from([
            ("source1".to_string(), Some(file("r1.fastq.gz", 1024))),
            ("source2".to_string(), Some(file("r2.fastq.gz", 2048))),
        ]),
        etag: BTreeMap::from([
            ("algorithm".to_string(), "FASTQ_MD5up".to_string()),
            ("source1".to_string(), "etag-1".to_string()),
        ]),
    }
}

pub fn sequence_store(store_id: &str) -> SequenceStore {
    SequenceStore {
        id: store_id.to_string(),
        arn: store_arn_for(store_id),
        name: Some(format!("{} name", store_id)),
        s3_access: Some(SequenceStoreS3Access {
            s3_uri: Some(format!("s3://{}-ap/{}/", store_id, store_id)),
            s3_access_point_arn: Some(format!(
                "arn:aws:s3:us-east-1:123456789012:accesspoint/{}",
                store_id
            )),
        }),
    }
}

/// Call counters kept by [`FakeSource`].
#[derive(Debug, Default, Clone)]
pub struct SourceCalls {
    pub metadata: usize,
    pub tags: usize,
    pub stores: usize,
    pub lists: usize,
}

#[derive(Default)]
struct FakeSourceState {
    read_sets: BTreeMap<(String, String), ReadSetMetadata>,
    tags: HashMap<String, BTreeMap<String, String>>,
    stores: HashMap<String, SequenceStore>,
    failing: HashMap<String, fn(String) -> SourceError>,
    failing_tags: HashMap<String, fn(String) -> SourceError>,
    calls: SourceCalls,
}

/// Sequence store served from memory. Listing pages use the numeric offset
/// of the next read set as the page token.
#[derive(Default)]
pub struct FakeSource {
    state: Mutex<FakeSourceState>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(self, store_id: &str) -> Self {
        self.add_store(sequence_store(store_id));
        self
    }

    pub fn add_store(&self, store: SequenceStore) {
        let mut state = self.state.lock().unwrap();
        state.stores.insert(store.id.clone(), store);
    }

    pub fn add_read_set(&self, store_id: &str, metadata: ReadSetMetadata) {
        let mut state = self.state.lock().unwrap();
        state
            .read_sets
            .insert((store_id.to_string(), metadata.id.clone()), metadata);
    }

    /// Add `count` read sets named `rs-0000`, `rs-0001`, ...
    pub fn with_read_sets(self, store_id: &str, count: usize) -> Self {
        for i in 0..count {
            self.add_read_set(store_id, read_set_metadata(&format!("rs-{:04}", i), store_id));
        }
        self
    }

    pub fn set_tags(&self, arn: &str, tags: BTreeMap<String, String>) {
        self.state.lock().unwrap().tags.insert(arn.to_string(), tags);
    }

    /// Make metadata lookups of `read_set_id` fail with the given error.
    pub fn fail_read_set(&self, read_set_id: &str, error: fn(String) -> SourceError) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert(read_set_id.to_string(), error);
    }

    /// Make tag lookups of `arn` fail with the given error.
    pub fn fail_tags(&self, arn: &str, error: fn(String) -> SourceError) {
        self.state
            .lock()
            .unwrap()
            .failing_tags
            .insert(arn.to_string(), error);
    }

    pub fn calls(&self) -> SourceCalls {
        self.state.lock().unwrap().calls.clone()
    }
}

#[async_trait]
impl MetadataSource for FakeSource {
    async fn get_read_set_metadata(
        &self,
        read_set_id: &str,
        store_id: &str,
    ) -> SourceResult<ReadSetMetadata> {
        let mut state = self.state.lock().unwrap();
        state.calls.metadata += 1;
        if let Some(error) = state.failing.get(read_set_id) {
            return Err(error(read_set_id.to_string()));
        }
        state
            .read_sets
            .get(&(store_id.to_string(), read_set_id.to_string()))
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("read set `{}`", read_set_id)))
    }

    async fn list_tags(&self, resource_arn: &str) -> SourceResult<BTreeMap<String, String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.tags += 1;
        if let Some(error) = state.failing_tags.get(resource_arn) {
            return Err(error(format!("tags of `{}`", resource_arn)));
        }
        Ok(state.tags.get(resource_arn).cloned().unwrap_or_default())
    }

    async fn get_sequence_store(&self, store_id: &str) -> SourceResult<SequenceStore> {
        let mut state = self.state.lock().unwrap();
        state.calls.stores += 1;
        state
            .stores
            .get(store_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("sequence store `{}`", store_id)))
    }

    async fn list_read_sets(
        &self,
        store_id: &str,
        next_token: Option<&str>,
        max_results: usize,
    ) -> SourceResult<ReadSetPage> {
        let mut state = self.state.lock().unwrap();
        state.calls.lists += 1;
        if !state.stores.contains_key(store_id) {
            return Err(SourceError::NotFound(format!("sequence store `{}`", store_id)));
        }

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| SourceError::Rejected {
                    status: 400,
                    message: format!("bad token {}", token),
                })?,
            None => 0,
        };

        let all: Vec<&ReadSetMetadata> = state
            .read_sets
            .iter()
            .filter(|((store, _), _)| store == store_id)
            .map(|(_, metadata)| metadata)
            .collect();
        let end = (offset + max_results).min(all.len());
        let read_sets = all[offset.min(end)..end]
            .iter()
            .map(|m| ReadSetSummary {
                id: m.id.clone(),
            })
            .collect();
        let next_token = (end < all.len()).then(|| end.to_string());

        Ok(ReadSetPage {
            read_sets,
            next_token,
        })
    }
}

/// A store write observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Upsert(String),
    UpdateStatus(String, ReadSetStatus),
    Remove(String),
}

/// Map-backed store that records every write and can be told to fail
/// writes for specific ids.
#[derive(Default)]
pub struct RecordingStore {
    records: Mutex<BTreeMap<String, MetadataRecord>>,
    calls: Mutex<Vec<StoreCall>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_writes_for(&self, id: &str) {
        self.failing.lock().unwrap().insert(id.to_string());
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetadataRecord> {
        self.records.lock().unwrap().clone()
    }

    fn check(&self, id: &str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(id) {
            return Err(sqlx::Error::Protocol(format!("injected failure for {}", id)).into());
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for RecordingStore {
    async fn upsert(&self, record: &MetadataRecord) -> StoreResult<()> {
        self.calls.lock().unwrap().push(StoreCall::Upsert(record.id.clone()));
        self.check(&record.id)?;
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_status(&self, id: &str, status: &ReadSetStatus) -> StoreResult<StatusUpdate> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::UpdateStatus(id.to_string(), status.clone()));
        self.check(id)?;
        Ok(match self.records.lock().unwrap().get_mut(id) {
            Some(record) => {
                record.status = status.clone();
                StatusUpdate::Applied
            }
            None => StatusUpdate::Missing,
        })
    }

    async fn remove(&self, id: &str) -> StoreResult<bool> {
        self.calls.lock().unwrap().push(StoreCall::Remove(id.to_string()));
        self.check(id)?;
        Ok(self.records.lock().unwrap().remove(id).is_some())
    }

    async fn get(&self, id: &str) -> StoreResult<Option<MetadataRecord>> {
        Ok(self.records.lock().unwrap().get(id).cloned())
    }

    async fn list_by_container(&self, container_id: &str) -> StoreResult<Vec<MetadataRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.container.id == container_id)
            .cloned()
            .collect())
    }
}
