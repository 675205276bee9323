// ============================================================
// SCHEMA DEFINITIONS
// ============================================================
// Object and field definitions proposed to the backend

use super::column_profile::label_from_api_name;
use super::{FieldType, TypeMap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub api_name: String,
    pub label: String,
    pub description: String,
}

impl ObjectDefinition {
    pub fn imported(api_name: &str) -> Self {
        Self {
            api_name: api_name.to_string(),
            label: label_from_api_name(api_name),
            description: format!("Imported Generic Object {}", api_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub api_name: String,
    pub label: String,
    pub field_type: FieldType,
}

impl FieldDefinition {
    pub fn new(api_name: impl Into<String>, label: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            api_name: api_name.into(),
            label: label.into(),
            field_type,
        }
    }

    /// Same field, relaxed to text.
    pub fn as_text(&self) -> Self {
        Self {
            field_type: FieldType::Text,
            ..self.clone()
        }
    }
}

/// What happened to one field during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldStatus {
    Created,
    AlreadyPresent,
    /// A reference was rejected and the field was created as text instead.
    DowngradedToText,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOutcome {
    pub definition: FieldDefinition,
    pub status: FieldStatus,
}

impl FieldOutcome {
    /// Type the backend actually holds for this field, as far as we know.
    pub fn effective_type(&self) -> FieldType {
        match self.status {
            FieldStatus::DowngradedToText => FieldType::Text,
            _ => self.definition.field_type.clone(),
        }
    }
}

/// Inferred schema for one object, keyed by normalized column name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaPlan {
    pub fields: Vec<FieldDefinition>,
}

impl SchemaPlan {
    pub fn type_map(&self) -> TypeMap {
        self.fields
            .iter()
            .map(|f| (f.api_name.clone(), f.field_type.clone()))
            .collect()
    }

    pub fn get(&self, api_name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.api_name == api_name)
    }

    /// Apply reconciliation results: downgraded fields become text and
    /// fields that could not be created are dropped.
    pub fn apply_outcomes(&mut self, outcomes: &[FieldOutcome]) {
        for outcome in outcomes {
            let name = &outcome.definition.api_name;
            if matches!(outcome.status, FieldStatus::Failed(_)) {
                self.fields.retain(|f| &f.api_name != name);
            } else if let Some(field) = self.fields.iter_mut().find(|f| &f.api_name == name) {
                field.field_type = outcome.effective_type();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downgraded_reference_becomes_text_in_plan() {
        let reference = FieldDefinition::new(
            "account_id",
            "Account Id",
            FieldType::Reference("account".to_string()),
        );
        let mut plan = SchemaPlan {
            fields: vec![reference.clone()],
        };
        plan.apply_outcomes(&[FieldOutcome {
            definition: reference,
            status: FieldStatus::DowngradedToText,
        }]);
        assert_eq!(plan.type_map()["account_id"], FieldType::Text);
    }

    #[test]
    fn test_failed_fields_leave_the_plan() {
        let amount = FieldDefinition::new("amount", "Amount", FieldType::Number);
        let notes = FieldDefinition::new("notes", "Notes", FieldType::Text);
        let mut plan = SchemaPlan {
            fields: vec![amount.clone(), notes],
        };
        plan.apply_outcomes(&[FieldOutcome {
            definition: amount,
            status: FieldStatus::Failed("API Error 400".to_string()),
        }]);
        assert!(plan.get("amount").is_none());
        assert!(plan.get("notes").is_some());
    }

    #[test]
    fn test_object_definition_label() {
        let def = ObjectDefinition::imported("sales_order");
        assert_eq!(def.label, "Sales Order");
        assert!(def.description.contains("sales_order"));
    }
}
