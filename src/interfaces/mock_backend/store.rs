// ============================================================
// IN-MEMORY OBJECT STORE
// ============================================================
// Metadata and record state behind the mock backend

use crate::domain::error::{AppError, Result};
use crate::domain::import::{FieldType, Record, REFERENCE_LOGICAL_TYPE, REFERENCE_PHYSICAL_TYPE};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

static DATE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

/// Fields every object accepts without a definition.
const BUILTIN_FIELDS: [&str; 2] = ["id", "name"];

#[derive(Debug, Clone, Default)]
pub struct StoredObject {
    pub label: String,
    pub description: String,
    pub fields: BTreeMap<String, FieldType>,
    pub records: Vec<Record>,
}

/// Object name -> field name -> type. Records excluded.
pub type SchemaSnapshot = BTreeMap<String, BTreeMap<String, FieldType>>;

/// Backend state. Every operation answers the way the REST surface would:
/// a JSON body on success, `AppError::ApiError` with the HTTP status otherwise.
#[derive(Debug, Default)]
pub struct BackendStore {
    objects: BTreeMap<String, StoredObject>,
    reference_targets: BTreeSet<String>,
    reject_object_creation: bool,
    unavailable_bulk_calls: usize,
    bulk_calls: usize,
}

fn reject(status: u16, message: impl Into<String>) -> AppError {
    AppError::ApiError {
        status,
        body: json!({ "error": message.into() }).to_string(),
    }
}

fn required_str<'a>(body: &'a Value, key: &str) -> Result<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| reject(400, format!("missing '{}'", key)))
}

impl BackendStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept lookups to `name` even though no such object exists here.
    #[cfg(test)]
    pub fn allow_reference_target(&mut self, name: &str) {
        self.reference_targets.insert(name.to_string());
    }

    /// Make every object creation fail with 400.
    #[cfg(test)]
    pub fn reject_object_creation(&mut self) {
        self.reject_object_creation = true;
    }

    /// Answer the next `count` bulk calls with 503.
    #[cfg(test)]
    pub fn fail_next_bulk_calls(&mut self, count: usize) {
        self.unavailable_bulk_calls = count;
    }

    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[cfg(test)]
    pub fn field_type(&self, object: &str, field: &str) -> Option<FieldType> {
        self.objects.get(object)?.fields.get(field).cloned()
    }

    pub fn records(&self, object: &str) -> Vec<Record> {
        self.objects
            .get(object)
            .map(|o| o.records.clone())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        self.objects
            .iter()
            .map(|(name, object)| (name.clone(), object.fields.clone()))
            .collect()
    }

    pub fn get_object(&self, name: &str) -> Result<Value> {
        let object = self
            .objects
            .get(name)
            .ok_or_else(|| reject(404, format!("object '{}' not found", name)))?;
        let fields: Vec<Value> = object
            .fields
            .iter()
            .map(|(api_name, field_type)| json!({ "api_name": api_name, "type": field_type.api_name() }))
            .collect();
        Ok(json!({
            "api_name": name,
            "label": object.label,
            "description": object.description,
            "fields": fields,
        }))
    }

    pub fn create_object(&mut self, body: &Value) -> Result<Value> {
        let api_name = required_str(body, "api_name")?.to_string();
        if self.reject_object_creation {
            return Err(reject(400, "object creation is disabled"));
        }
        if self.objects.contains_key(&api_name) {
            return Err(reject(409, format!("object '{}' already exists", api_name)));
        }
        let object = StoredObject {
            label: body.get("label").and_then(Value::as_str).unwrap_or(&api_name).to_string(),
            description: body
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            ..Default::default()
        };
        self.objects.insert(api_name.clone(), object);
        Ok(json!({ "data": { "api_name": api_name } }))
    }

    pub fn create_field(&mut self, object: &str, body: &Value) -> Result<Value> {
        let api_name = required_str(body, "api_name")?.to_string();
        let field_type = self.parse_field_type(body)?;

        if let Some(target) = field_type.reference_target() {
            if !self.objects.contains_key(target) && !self.reference_targets.contains(target) {
                return Err(reject(400, format!("reference target '{}' does not exist", target)));
            }
        }

        let stored = self
            .objects
            .get_mut(object)
            .ok_or_else(|| reject(404, format!("object '{}' not found", object)))?;
        if stored.fields.contains_key(&api_name) {
            return Err(reject(409, format!("field '{}' already exists", api_name)));
        }
        stored.fields.insert(api_name.clone(), field_type.clone());
        Ok(json!({ "data": { "api_name": api_name, "type": field_type.api_name() } }))
    }

    pub fn update_field(&mut self, object: &str, field: &str, body: &Value) -> Result<Value> {
        let type_name = required_str(body, "type")?;
        let field_type = FieldType::from_api_name(type_name, None);
        let stored = self
            .objects
            .get_mut(object)
            .ok_or_else(|| reject(404, format!("object '{}' not found", object)))?;
        let slot = stored
            .fields
            .get_mut(field)
            .ok_or_else(|| reject(404, format!("field '{}' not found", field)))?;
        *slot = field_type;
        Ok(json!({ "data": { "api_name": field, "type": type_name } }))
    }

    /// Validate every record against the object's fields and keep the good ones.
    pub fn bulk_insert(&mut self, object: &str, body: &Value) -> Result<Value> {
        self.bulk_calls += 1;
        if self.unavailable_bulk_calls > 0 {
            self.unavailable_bulk_calls -= 1;
            return Err(reject(503, "service unavailable"));
        }

        let records = body
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| reject(400, "missing 'records'"))?;
        let stored = self
            .objects
            .get_mut(object)
            .ok_or_else(|| reject(404, format!("object '{}' not found", object)))?;

        let mut errors = Vec::new();
        let mut success = 0usize;
        for (index, record) in records.iter().enumerate() {
            let Some(record) = record.as_object() else {
                errors.push(format!("record {}: not an object", index));
                continue;
            };
            match validate_record(&stored.fields, record) {
                Ok(()) => {
                    stored.records.push(record.clone());
                    success += 1;
                }
                Err(message) => errors.push(format!("record {}: {}", index, message)),
            }
        }

        Ok(json!({
            "data": {
                "success_count": success,
                "failed_count": errors.len(),
                "errors": errors,
            }
        }))
    }

    fn parse_field_type(&self, body: &Value) -> Result<FieldType> {
        let type_name = required_str(body, "type")?;
        let logical = body.get("logicalType").and_then(Value::as_str);
        if type_name == REFERENCE_PHYSICAL_TYPE && logical == Some(REFERENCE_LOGICAL_TYPE) {
            let target = body
                .get("referenceTo")
                .and_then(Value::as_array)
                .and_then(|targets| targets.first())
                .and_then(Value::as_str)
                .ok_or_else(|| reject(400, "lookup field without 'referenceTo'"))?;
            return Ok(FieldType::Reference(target.to_string()));
        }
        Ok(FieldType::from_api_name(type_name, None))
    }
}

fn validate_record(fields: &BTreeMap<String, FieldType>, record: &Record) -> std::result::Result<(), String> {
    for (key, value) in record {
        if BUILTIN_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let Some(field_type) = fields.get(key) else {
            return Err(format!("unknown field '{}'", key));
        };
        let expected = match field_type {
            FieldType::Number if !is_number(value) => Some("number"),
            FieldType::Boolean if !value.is_boolean() => Some("boolean"),
            FieldType::DateTime if !value.as_str().is_some_and(|s| DATE_PREFIX.is_match(s)) => {
                Some("datetime")
            }
            FieldType::Email if !value.as_str().is_some_and(|s| s.contains('@')) => Some("email"),
            _ => None,
        };
        if let Some(expected) = expected {
            return Err(format!("validation error on field '{}': expected {}", key, expected));
        }
    }
    Ok(())
}

fn is_number(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_deal() -> BackendStore {
        let mut store = BackendStore::new();
        store.create_object(&json!({"api_name": "deal", "label": "Deal"})).unwrap();
        store
            .create_field("deal", &json!({"api_name": "amount", "label": "Amount", "type": "Number"}))
            .unwrap();
        store
    }

    #[test]
    fn test_duplicates_are_conflicts() {
        let mut store = store_with_deal();
        let err = store.create_object(&json!({"api_name": "deal"})).unwrap_err();
        assert!(err.is_duplicate());
        let err = store
            .create_field("deal", &json!({"api_name": "amount", "type": "Number"}))
            .unwrap_err();
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_lookup_requires_known_target() {
        let mut store = store_with_deal();
        let lookup = json!({
            "api_name": "owner_id",
            "type": "VARCHAR(255)",
            "logicalType": "Lookup",
            "referenceTo": ["owner"]
        });
        let err = store.create_field("deal", &lookup).unwrap_err();
        assert_eq!(err.status(), Some(400));

        store.allow_reference_target("owner");
        store.create_field("deal", &lookup).unwrap();
        assert_eq!(
            store.field_type("deal", "owner_id"),
            Some(FieldType::Reference("owner".to_string()))
        );
    }

    #[test]
    fn test_bulk_reports_type_mismatch_per_record() {
        let mut store = store_with_deal();
        let body = json!({
            "records": [
                {"name": "a", "amount": 10},
                {"name": "b", "amount": "12.5"},
                {"name": "c", "amount": "lots"},
                {"name": "d", "color": "red"}
            ],
            "batch_size": 4
        });
        let response = store.bulk_insert("deal", &body).unwrap();
        assert_eq!(response["data"]["success_count"], 2);
        assert_eq!(response["data"]["failed_count"], 2);
        assert_eq!(
            response["data"]["errors"][0],
            "record 2: validation error on field 'amount': expected number"
        );
        assert_eq!(response["data"]["errors"][1], "record 3: unknown field 'color'");
        assert_eq!(store.records("deal").len(), 2);
    }

    #[test]
    fn test_injected_outage_then_recovery() {
        let mut store = store_with_deal();
        store.fail_next_bulk_calls(1);
        let body = json!({"records": [{"name": "a"}], "batch_size": 1});
        let err = store.bulk_insert("deal", &body).unwrap_err();
        assert!(err.is_transient());
        assert!(store.bulk_insert("deal", &body).is_ok());
        assert_eq!(store.bulk_calls(), 2);
    }
}
