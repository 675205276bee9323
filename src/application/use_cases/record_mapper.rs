// ============================================================
// RECORD MAPPER
// ============================================================
// Turn raw source rows into typed records for bulk insert

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Number, Value};
use sha2::{Digest, Sha256};

use super::type_inference::{strip_number_decorations, IMPORT_KEY_FIELD};
use crate::domain::import::{FieldType, HeaderSet, ImportConfig, Record, SourceRow, TypeMap};

/// Columns tried, in order, for a record's display name.
const NAME_CANDIDATES: [&str; 4] = ["id", "title", "subject", "email"];

/// Keys that alone do not make a record worth inserting.
const IDENTITY_KEYS: [&str; 3] = ["id", "name", IMPORT_KEY_FIELD];

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[./-](\d{2})[./-](\d{2})").unwrap());
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})").unwrap());

const TRUTHY: [&str; 5] = ["true", "1", "yes", "y", "t"];
const FALSY: [&str; 5] = ["false", "0", "no", "n", "f"];

/// Maps rows of one source. Column types may be relaxed to text mid-run.
pub struct RecordMapper {
    object: String,
    /// Target field and type per header position; `None` for unmapped columns
    columns: Vec<Option<(String, FieldType)>>,
    /// Positions of the name candidates that exist, in candidate order
    name_sources: Vec<usize>,
    config: ImportConfig,
}

impl RecordMapper {
    pub fn new(object: &str, headers: &HeaderSet, types: &TypeMap, config: &ImportConfig) -> Self {
        let columns = headers
            .columns
            .iter()
            .map(|column| {
                let name = column.as_ref()?;
                types.get(name).map(|t| (name.clone(), t.clone()))
            })
            .collect();

        let name_sources = NAME_CANDIDATES
            .iter()
            .filter_map(|candidate| headers.positions_of(candidate).last().copied())
            .collect();

        Self {
            object: object.to_string(),
            columns,
            name_sources,
            config: config.clone(),
        }
    }

    /// Send every later value of `field` as plain text.
    pub fn downgrade(&mut self, field: &str) {
        for (name, field_type) in self.columns.iter_mut().flatten() {
            if name == field {
                *field_type = FieldType::Text;
            }
        }
    }

    /// Build the record for source row `row_index` (0-based, header excluded).
    /// Returns `None` when nothing but identity keys would be sent.
    pub fn map(&self, row: &SourceRow, row_index: usize) -> Option<Record> {
        let mut record = Record::new();
        for (position, column) in self.columns.iter().enumerate() {
            let Some((name, field_type)) = column else {
                continue;
            };
            // Short rows: missing trailing cells are absent values.
            let Some(cell) = self.present(row, position) else {
                continue;
            };
            record.insert(name.clone(), normalize_value(cell, field_type));
        }

        let meaningful = record
            .keys()
            .any(|key| !IDENTITY_KEYS.contains(&key.as_str()));
        if !meaningful {
            return None;
        }

        if !record.contains_key("name") {
            record.insert("name".to_string(), Value::String(self.synthesize_name(row, row_index)));
        }
        if self.config.idempotency_keys {
            record.insert(
                IMPORT_KEY_FIELD.to_string(),
                Value::String(import_key(&self.object, row_index)),
            );
        }
        Some(record)
    }

    fn present<'r>(&self, row: &'r SourceRow, position: usize) -> Option<&'r str> {
        let cell = row.get(position)?.trim();
        if cell.is_empty() || self.config.is_null_marker(cell) {
            return None;
        }
        Some(cell)
    }

    fn synthesize_name(&self, row: &SourceRow, row_index: usize) -> String {
        self.name_sources
            .iter()
            .find_map(|&position| self.present(row, position))
            .map(|value| value.chars().take(self.config.max_name_len).collect())
            .unwrap_or_else(|| format!("Record {}", row_index + 1))
    }
}

/// Deterministic per-row key: hex sha256 of `object:row_index`.
pub fn import_key(object: &str, row_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", object, row_index).as_bytes());
    hex::encode(hasher.finalize())
}

/// Normalize one non-empty cell for its column type. Values that do not
/// parse are passed through as strings and left for the backend to judge.
pub fn normalize_value(cell: &str, field_type: &FieldType) -> Value {
    match field_type {
        FieldType::DateTime => Value::String(normalize_date(cell)),
        FieldType::Number => normalize_number(cell),
        FieldType::Boolean => normalize_boolean(cell),
        _ => Value::String(cell.to_string()),
    }
}

/// Reduce a date-like value to `YYYY-MM-DD`. `a/b/yyyy` reads as day-first
/// when `a` cannot be a month, month-first otherwise.
pub fn normalize_date(value: &str) -> String {
    if let Some(caps) = ISO_DATE.captures(value) {
        return format!("{}-{}-{}", &caps[1], &caps[2], &caps[3]);
    }
    if let Some(caps) = SLASH_DATE.captures(value) {
        let first: u32 = caps[1].parse().unwrap_or(0);
        let second: u32 = caps[2].parse().unwrap_or(0);
        let (month, day) = if first > 12 { (second, first) } else { (first, second) };
        return format!("{}-{:02}-{:02}", &caps[3], month, day);
    }
    value.to_string()
}

fn normalize_number(value: &str) -> Value {
    let cleaned = strip_number_decorations(value);
    if let Ok(int) = cleaned.parse::<i64>() {
        return Value::from(int);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(value.to_string()))
}

fn normalize_boolean(value: &str) -> Value {
    let lower = value.to_lowercase();
    if TRUTHY.contains(&lower.as_str()) {
        Value::Bool(true)
    } else if FALSY.contains(&lower.as_str()) {
        Value::Bool(false)
    } else {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn headers(names: &[&str]) -> HeaderSet {
        HeaderSet::new(names.iter().map(|n| n.to_string()).collect())
    }

    fn row(cells: &[&str]) -> SourceRow {
        cells.iter().map(|c| c.to_string()).collect()
    }

    fn types(pairs: &[(&str, FieldType)]) -> TypeMap {
        pairs
            .iter()
            .map(|(n, t)| (n.to_string(), t.clone()))
            .collect()
    }

    #[test]
    fn test_values_are_normalized_per_type() {
        let mapper = RecordMapper::new(
            "deal",
            &headers(&["Name", "Closed", "Amount", "Won", "Owner_Id"]),
            &types(&[
                ("name", FieldType::Text),
                ("closed", FieldType::DateTime),
                ("amount", FieldType::Number),
                ("won", FieldType::Boolean),
                ("owner_id", FieldType::Reference("owner".to_string())),
            ]),
            &ImportConfig::default(),
        );
        let record = mapper
            .map(&row(&[" Acme ", "2024/01/15 10:00", "$1,500.50", "Yes", "42"]), 0)
            .unwrap();
        assert_eq!(record["name"], json!("Acme"));
        assert_eq!(record["closed"], json!("2024-01-15"));
        assert_eq!(record["amount"], json!(1500.5));
        assert_eq!(record["won"], json!(true));
        assert_eq!(record["owner_id"], json!("42"));
    }

    #[test]
    fn test_unparseable_values_pass_through() {
        assert_eq!(normalize_value("bad", &FieldType::Number), json!("bad"));
        assert_eq!(normalize_value("maybe", &FieldType::Boolean), json!("maybe"));
        assert_eq!(normalize_value("soon", &FieldType::DateTime), json!("soon"));
        assert_eq!(normalize_value("1,200", &FieldType::Number), json!(1200));
    }

    #[test]
    fn test_slash_dates_pick_day_first_only_when_forced() {
        assert_eq!(normalize_date("3/4/2024"), "2024-03-04");
        assert_eq!(normalize_date("25/12/2023"), "2023-12-25");
        assert_eq!(normalize_date("2024.02.01"), "2024-02-01");
    }

    #[test]
    fn test_empty_cells_and_null_markers_are_dropped() {
        let mapper = RecordMapper::new(
            "deal",
            &headers(&["name", "created_date", "amount"]),
            &types(&[
                ("name", FieldType::Text),
                ("created_date", FieldType::DateTime),
                ("amount", FieldType::Text),
            ]),
            &ImportConfig::default(),
        );
        let record = mapper.map(&row(&["Initech", "N/A", ""]), 2).unwrap();
        assert_eq!(record.len(), 1);
        assert_eq!(record["name"], json!("Initech"));
    }

    #[test]
    fn test_identity_only_rows_are_skipped() {
        let mapper = RecordMapper::new(
            "deal",
            &headers(&["id", "name", "notes"]),
            &types(&[
                ("id", FieldType::Number),
                ("name", FieldType::Text),
                ("notes", FieldType::Text),
            ]),
            &ImportConfig::default(),
        );
        assert!(mapper.map(&row(&["7", "Acme", ""]), 0).is_none());
        assert!(mapper.map(&row(&["7", "Acme", "call back"]), 0).is_some());
    }

    #[test]
    fn test_name_is_synthesized_from_candidates() {
        let config = ImportConfig {
            max_name_len: 5,
            ..Default::default()
        };
        let mapper = RecordMapper::new(
            "ticket",
            &headers(&["subject", "priority"]),
            &types(&[("priority", FieldType::Number)]),
            &config,
        );
        let record = mapper.map(&row(&["Printer on fire", "1"]), 0).unwrap();
        assert_eq!(record["name"], json!("Print"));

        // Short row: the subject cell is missing entirely.
        let record = mapper.map(&row(&["", "2"]), 9).unwrap();
        assert_eq!(record["name"], json!("Record 10"));
    }

    #[test]
    fn test_downgrade_sends_raw_text() {
        let mut mapper = RecordMapper::new(
            "deal",
            &headers(&["name", "amount"]),
            &types(&[("name", FieldType::Text), ("amount", FieldType::Number)]),
            &ImportConfig::default(),
        );
        mapper.downgrade("amount");
        let record = mapper.map(&row(&["Acme", "1500"]), 0).unwrap();
        assert_eq!(record["amount"], json!("1500"));
    }

    #[test]
    fn test_import_key_is_stable_per_row() {
        let config = ImportConfig {
            idempotency_keys: true,
            ..Default::default()
        };
        let mapper = RecordMapper::new(
            "deal",
            &headers(&["name", "notes"]),
            &types(&[("name", FieldType::Text), ("notes", FieldType::Text)]),
            &config,
        );
        let first = mapper.map(&row(&["Acme", "x"]), 3).unwrap();
        let again = mapper.map(&row(&["Other", "y"]), 3).unwrap();
        assert_eq!(first[IMPORT_KEY_FIELD], again[IMPORT_KEY_FIELD]);
        assert_eq!(first[IMPORT_KEY_FIELD], json!(import_key("deal", 3)));
        assert_ne!(import_key("deal", 3), import_key("deal", 4));
        assert_eq!(import_key("deal", 3).len(), 64);
    }
}
