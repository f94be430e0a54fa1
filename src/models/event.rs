//! Queue batches and the read set status-change events they carry.

use crate::models::record::ReadSetStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A batch of queue messages as delivered by the queue trigger.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct QueueBatch {
    #[serde(rename = "Records", default)]
    pub records: Vec<QueueMessage>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct QueueMessage {
    #[serde(rename = "messageId", default)]
    pub message_id: String,

    /// Raw JSON text of the message.
    #[serde(default)]
    pub body: String,
}

/// A read set status change, the unit the reconciler acts on.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeEvent {
    /// Read set id.
    pub id: String,
    pub sequence_store_id: String,
    /// Read set ARN, the record key.
    pub arn: String,
    /// Absent or `null` decodes as an unknown status, which is a no-op.
    #[serde(default)]
    pub status: ReadSetStatus,
}

impl QueueMessage {
    /// Decode the message body.
    ///
    /// Accepts either the status-change detail itself or the rule target
    /// envelope `{detail, detailType, source, time}`. Returns `Ok(None)` for
    /// empty bodies, `null` and `{}`.
    pub fn event(&self) -> Result<Option<StatusChangeEvent>, serde_json::Error> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }

        let value: Value = serde_json::from_str(&self.body)?;
        let detail = match value {
            Value::Object(mut map) => match map.remove("detail") {
                Some(detail @ Value::Object(_)) => detail,
                Some(Value::Null) | None if map.is_empty() => return Ok(None),
                Some(other) => {
                    map.insert("detail".into(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            },
            Value::Null => return Ok(None),
            other => other,
        };

        if detail.as_object().is_some_and(|m| m.is_empty()) {
            return Ok(None);
        }

        serde_json::from_value(detail).map(Some)
    }
}

/// Response returned to the queue trigger.
///
/// `statusCode = 200` acknowledges the batch, except for the messages listed
/// in `batchItemFailures`, which the queue redelivers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub status_code: u16,
    pub body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}
