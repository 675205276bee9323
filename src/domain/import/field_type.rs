// ============================================================
// FIELD TYPE ENUM
// ============================================================
// Storage type proposed for one imported column

use serde::{Deserialize, Serialize};

/// Physical storage type the backend expects for reference fields.
pub const REFERENCE_PHYSICAL_TYPE: &str = "VARCHAR(255)";

/// Logical marker sent alongside the physical type for reference fields.
pub const REFERENCE_LOGICAL_TYPE: &str = "Lookup";

/// Type of a field for the whole import. There is no per-row typing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Free text. Always the safe fallback.
    Text,
    Boolean,
    Number,
    DateTime,
    Email,
    Url,
    /// Cross-object reference to the named target object.
    Reference(String),
}

impl FieldType {
    /// Type name used by the metadata API.
    pub fn api_name(&self) -> &'static str {
        match self {
            FieldType::Text => "LongTextArea",
            FieldType::Boolean => "Boolean",
            FieldType::Number => "Number",
            FieldType::DateTime => "DateTime",
            FieldType::Email => "Email",
            FieldType::Url => "Url",
            FieldType::Reference(_) => "Lookup",
        }
    }

    /// Parse a metadata API type name. Unknown names map to `Text`.
    pub fn from_api_name(name: &str, reference_to: Option<&str>) -> Self {
        match name {
            "Boolean" => FieldType::Boolean,
            "Number" => FieldType::Number,
            "DateTime" => FieldType::DateTime,
            "Email" => FieldType::Email,
            "Url" => FieldType::Url,
            "Lookup" => match reference_to {
                Some(target) => FieldType::Reference(target.to_string()),
                None => FieldType::Text,
            },
            _ => FieldType::Text,
        }
    }

    pub fn reference_target(&self) -> Option<&str> {
        match self {
            FieldType::Reference(target) => Some(target.as_str()),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::Reference(_))
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Reference(target) => write!(f, "Reference({})", target),
            FieldType::Text => write!(f, "Text"),
            other => write!(f, "{}", other.api_name()),
        }
    }
}
