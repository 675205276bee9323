// ============================================================
// BATCH TYPES
// ============================================================
// Records destined for one bulk-insert call

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One normalized record: column name -> value.
pub type Record = Map<String, Value>;

/// Bulk batch. Holds `1..=batch_size` records.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Sequence number in submission order (0-based)
    pub sequence: usize,

    /// Source row index of the first row read into this batch
    pub first_row: usize,

    /// Source row index one past the last row read into this batch
    pub end_row: usize,

    pub records: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Rows per batch so that `rows * columns` stays within the placeholder ceiling.
/// Never returns less than one.
pub fn compute_batch_size(configured: usize, payload_ceiling: usize, column_count: usize) -> usize {
    let configured = configured.max(1);
    if column_count == 0 {
        return configured;
    }
    let safe_limit = payload_ceiling / column_count;
    configured.min(safe_limit).max(1)
}

/// Result of one bulk-insert call as reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BulkOutcome {
    #[serde(default)]
    pub success_count: usize,

    #[serde(default)]
    pub failed_count: usize,

    /// Per-row failure messages
    #[serde(default, deserialize_with = "deserialize_messages")]
    pub errors: Vec<String>,
}

impl BulkOutcome {
    /// Read a bulk response, unwrapping an optional `data` envelope.
    pub fn from_response(value: &Value) -> Self {
        let inner = match value.get("data") {
            Some(data) if data.is_object() => data,
            _ => value,
        };
        serde_json::from_value(inner.clone()).unwrap_or_default()
    }
}

fn deserialize_messages<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|v| match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}
