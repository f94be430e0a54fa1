//! Response shapes returned by the sequence store API.
//!
//! Only the fields the sync reads are declared; everything else in the
//! payload is ignored on decode.

use serde::Deserialize;
use std::collections::BTreeMap;

/// `GET /sequencestore/{storeId}/readset/{id}/metadata`
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReadSetMetadata {
    pub id: String,
    pub arn: String,
    pub subject_id: Option<String>,
    pub sample_id: Option<String>,
    pub status: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub file_type: Option<String>,
    pub reference_arn: Option<String>,

    /// File slots keyed by role. Slots the store reports as `null` are
    /// skipped during assembly.
    #[serde(default)]
    pub files: BTreeMap<String, Option<FileInformation>>,

    /// Per-slot checksums keyed by role, plus an `algorithm` entry.
    #[serde(default)]
    pub etag: BTreeMap<String, String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileInformation {
    pub total_parts: Option<u64>,
    pub part_size: Option<u64>,
    pub content_length: Option<u64>,
    pub s3_access: Option<FileS3Access>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileS3Access {
    pub s3_uri: Option<String>,
}

/// `GET /sequencestore/{storeId}`
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStore {
    pub id: String,
    pub arn: String,
    pub name: Option<String>,
    pub s3_access: Option<SequenceStoreS3Access>,
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SequenceStoreS3Access {
    pub s3_uri: Option<String>,
    pub s3_access_point_arn: Option<String>,
}

/// `GET /tags/{resourceArn}`
#[derive(Deserialize, Clone, Debug, Default)]
pub struct TagList {
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// One entry of a read set listing page.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReadSetSummary {
    pub id: String,
}

/// `POST /sequencestore/{storeId}/readsets`
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReadSetPage {
    #[serde(default)]
    pub read_sets: Vec<ReadSetSummary>,
    pub next_token: Option<String>,
}
