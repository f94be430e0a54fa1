//! Builds a `MetadataRecord` from the sequence store API.
//!
//! Assembly is read-only: the record is returned to the caller and nothing
//! is written here. Any failed lookup aborts the whole record.

use crate::{
    models::{
        record::{ContainerInfo, FileEntry, MetadataRecord, ReadSetStatus, SEQUENCE_STORE_KIND},
        source::{ReadSetMetadata, SequenceStore},
    },
    services::source_client::{MetadataSource, SourceError, SourceResult},
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::debug;

#[derive(Clone)]
pub struct RecordAssembler {
    source: Arc<dyn MetadataSource>,
}

impl RecordAssembler {
    pub fn new(source: Arc<dyn MetadataSource>) -> Self {
        Self { source }
    }

    /// Fetch read set metadata, tags and sequence store metadata and
    /// compose the full record.
    pub async fn assemble(&self, read_set_id: &str, store_id: &str) -> SourceResult<MetadataRecord> {
        let (metadata, tags) = self.fetch_read_set(read_set_id, store_id).await?;
        let files = file_entries(&metadata)?;
        let container = self.fetch_container(store_id).await?;
        Ok(compose(metadata, tags, files, container))
    }

    /// Same as [`assemble`](Self::assemble) but reuses a container snapshot
    /// the caller already holds.
    pub async fn assemble_with_container(
        &self,
        read_set_id: &str,
        container: &ContainerInfo,
    ) -> SourceResult<MetadataRecord> {
        let (metadata, tags) = self.fetch_read_set(read_set_id, &container.id).await?;
        let files = file_entries(&metadata)?;
        Ok(compose(metadata, tags, files, container.clone()))
    }

    pub async fn fetch_container(&self, store_id: &str) -> SourceResult<ContainerInfo> {
        let store = self.source.get_sequence_store(store_id).await?;
        Ok(container_info(store))
    }

    async fn fetch_read_set(
        &self,
        read_set_id: &str,
        store_id: &str,
    ) -> SourceResult<(ReadSetMetadata, Option<BTreeMap<String, String>>)> {
        let metadata = self
            .source
            .get_read_set_metadata(read_set_id, store_id)
            .await
            .map_err(|err| match err {
                SourceError::NotFound(what) => SourceError::ReadSetGone(what),
                other => other,
            })?;
        let tags = self.source.list_tags(&metadata.arn).await?;
        debug!(read_set_id, store_id, tag_count = tags.len(), "fetched read set metadata");
        Ok((metadata, (!tags.is_empty()).then_some(tags)))
    }
}

/// One entry per populated file slot, in slot-key order.
fn file_entries(metadata: &ReadSetMetadata) -> SourceResult<Vec<FileEntry>> {
    metadata
        .files
        .iter()
        .filter_map(|(role, info)| info.as_ref().map(|info| (role, info)))
        .map(|(role, info)| {
            let path = info
                .s3_access
                .as_ref()
                .and_then(|access| access.s3_uri.clone())
                .ok_or_else(|| {
                    SourceError::Malformed(format!(
                        "file slot `{}` of read set `{}` has no storage URI",
                        role, metadata.id
                    ))
                })?;

            Ok(FileEntry {
                path,
                checksum: metadata.etag.get(role).cloned().unwrap_or_default(),
                role: role.clone(),
                byte_length: info.content_length.unwrap_or(0),
                part_size: info.part_size,
                part_count: info.total_parts,
            })
        })
        .collect()
}

fn container_info(store: SequenceStore) -> ContainerInfo {
    let (uri, access_point_arn) = match store.s3_access {
        Some(access) => (access.s3_uri, access.s3_access_point_arn),
        None => (None, None),
    };
    ContainerInfo {
        id: store.id,
        arn: store.arn,
        kind: SEQUENCE_STORE_KIND.to_string(),
        name: store.name,
        access_point_arn,
        uri,
    }
}

fn compose(
    metadata: ReadSetMetadata,
    tags: Option<BTreeMap<String, String>>,
    files: Vec<FileEntry>,
    container: ContainerInfo,
) -> MetadataRecord {
    MetadataRecord {
        id: metadata.arn,
        object_id: Some(metadata.id),
        file_type: metadata.file_type,
        name: metadata.name,
        description: metadata.description,
        reference_id: metadata.reference_arn,
        sample_id: metadata.sample_id,
        subject_id: metadata.subject_id,
        status: ReadSetStatus::parse(&metadata.status),
        tags,
        files,
        container,
    }
}
