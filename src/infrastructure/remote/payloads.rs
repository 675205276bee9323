// Request bodies for the metadata and bulk APIs

use crate::domain::import::{
    FieldDefinition, FieldType, ObjectDefinition, Record, REFERENCE_LOGICAL_TYPE,
    REFERENCE_PHYSICAL_TYPE,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct CreateObjectRequest<'a> {
    pub api_name: &'a str,
    pub label: &'a str,
    pub description: &'a str,
}

impl<'a> From<&'a ObjectDefinition> for CreateObjectRequest<'a> {
    fn from(def: &'a ObjectDefinition) -> Self {
        Self {
            api_name: &def.api_name,
            label: &def.label,
            description: &def.description,
        }
    }
}

/// A reference field is sent with a fixed physical type plus the logical
/// marker and its target list.
#[derive(Debug, Serialize)]
pub struct CreateFieldRequest<'a> {
    pub api_name: &'a str,
    pub label: &'a str,
    #[serde(rename = "type")]
    pub field_type: &'static str,
    #[serde(rename = "logicalType", skip_serializing_if = "Option::is_none")]
    pub logical_type: Option<&'static str>,
    #[serde(rename = "referenceTo", skip_serializing_if = "Option::is_none")]
    pub reference_to: Option<Vec<&'a str>>,
}

impl<'a> From<&'a FieldDefinition> for CreateFieldRequest<'a> {
    fn from(def: &'a FieldDefinition) -> Self {
        match def.field_type.reference_target() {
            Some(target) => Self {
                api_name: &def.api_name,
                label: &def.label,
                field_type: REFERENCE_PHYSICAL_TYPE,
                logical_type: Some(REFERENCE_LOGICAL_TYPE),
                reference_to: Some(vec![target]),
            },
            None => Self {
                api_name: &def.api_name,
                label: &def.label,
                field_type: def.field_type.api_name(),
                logical_type: None,
                reference_to: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdateFieldTypeRequest {
    #[serde(rename = "type")]
    pub field_type: &'static str,
}

impl UpdateFieldTypeRequest {
    pub fn new(field_type: &FieldType) -> Self {
        Self {
            field_type: field_type.api_name(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BulkInsertRequest<'a> {
    pub records: &'a [Record],
    pub batch_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_field_payload() {
        let def = FieldDefinition::new(
            "account_id",
            "Account Id",
            FieldType::Reference("account".to_string()),
        );
        let body = serde_json::to_value(CreateFieldRequest::from(&def)).unwrap();
        assert_eq!(
            body,
            json!({
                "api_name": "account_id",
                "label": "Account Id",
                "type": "VARCHAR(255)",
                "logicalType": "Lookup",
                "referenceTo": ["account"]
            })
        );
    }

    #[test]
    fn test_plain_field_payload_has_no_reference_keys() {
        let def = FieldDefinition::new("notes", "Notes", FieldType::Text);
        let body = serde_json::to_value(CreateFieldRequest::from(&def)).unwrap();
        assert_eq!(body, json!({"api_name": "notes", "label": "Notes", "type": "LongTextArea"}));
    }
}
