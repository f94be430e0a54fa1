//! Represents the denormalized read set record kept in the metadata table.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Label stored in every container snapshot.
pub const SEQUENCE_STORE_KIND: &str = "sequence_store";

/// Lifecycle status of a read set as reported by the sequence store.
///
/// Known statuses parse case-insensitively and are written in their
/// canonical upper-case form. Anything else is kept verbatim in `Other`,
/// and a missing or `null` status decodes as the empty `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum ReadSetStatus {
    Activating,
    Active,
    Archived,
    Deleting,
    Deleted,
    Other(String),
}

impl ReadSetStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVATING" => Self::Activating,
            "ACTIVE" => Self::Active,
            "ARCHIVED" => Self::Archived,
            "DELETING" => Self::Deleting,
            "DELETED" => Self::Deleted,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Activating => "ACTIVATING",
            Self::Active => "ACTIVE",
            Self::Archived => "ARCHIVED",
            Self::Deleting => "DELETING",
            Self::Deleted => "DELETED",
            Self::Other(raw) => raw,
        }
    }
}

impl Default for ReadSetStatus {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for ReadSetStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<Option<String>> for ReadSetStatus {
    fn from(raw: Option<String>) -> Self {
        raw.map(Self::from).unwrap_or_default()
    }
}

impl From<ReadSetStatus> for String {
    fn from(status: ReadSetStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ReadSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the metadata table.
///
/// The record is rebuilt from scratch on every full write: `files` and
/// `container` are replaced, never merged with what was stored before.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    /// Read set ARN. Primary key of the table.
    pub id: String,

    /// Read set id inside its sequence store.
    pub object_id: Option<String>,

    /// File type reported by the store (e.g. `FASTQ`, `BAM`, `CRAM`).
    #[serde(rename = "type")]
    pub file_type: Option<String>,

    pub name: Option<String>,
    pub description: Option<String>,
    pub reference_id: Option<String>,
    pub sample_id: Option<String>,
    pub subject_id: Option<String>,

    pub status: ReadSetStatus,

    /// User tags. `None` whenever the read set carries no tags; an empty
    /// map is never written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,

    #[serde(default)]
    pub files: Vec<FileEntry>,

    pub container: ContainerInfo,
}

/// Metadata for one file slot of a read set (`source1`, `source2`, `index`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Storage URI of the file.
    pub path: String,

    /// Per-slot etag, or an empty string when the store exposes none.
    pub checksum: String,

    /// Which slot this file occupies.
    pub role: String,

    pub byte_length: u64,
    pub part_size: Option<u64>,
    pub part_count: Option<u64>,
}

/// Snapshot of the owning sequence store, copied into every record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub arn: String,
    pub kind: String,
    pub name: Option<String>,
    pub access_point_arn: Option<String>,
    pub uri: Option<String>,
}
