// ============================================================
// ERROR CATEGORIES
// ============================================================
// Short tags for tallying failures in the run summary

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static TYPE_MISMATCH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"validation error on field '([^']+)': expected (\w+)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorKind {
    TypeBoolean,
    TypeNumber,
    DataTooLong,
    Auth,
    Timeout,
    BulkValidation,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TypeBoolean => "type:boolean",
            ErrorKind::TypeNumber => "type:number",
            ErrorKind::DataTooLong => "data_too_long",
            ErrorKind::Auth => "auth_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::BulkValidation => "bulk_validation_error",
            ErrorKind::Other => "other",
        }
    }

    /// Categorize a whole-request failure message.
    pub fn classify(message: &str) -> Self {
        if message.contains("expected boolean") {
            ErrorKind::TypeBoolean
        } else if message.contains("expected number") {
            ErrorKind::TypeNumber
        } else if message.contains("Data too long") {
            ErrorKind::DataTooLong
        } else if message.contains("Unauthorized") || message.contains("API Error 401") {
            ErrorKind::Auth
        } else if message.to_lowercase().contains("timeout")
            || message.to_lowercase().contains("timed out")
        {
            ErrorKind::Timeout
        } else {
            ErrorKind::Other
        }
    }

    /// Categorize a per-row bulk failure message. Unrecognized rows count as
    /// generic validation failures.
    pub fn classify_row(message: &str) -> Self {
        match Self::classify(message) {
            ErrorKind::Other => ErrorKind::BulkValidation,
            kind => kind,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A backend rejection caused by a value not matching the field's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub field: String,
    pub expected: String,
}

impl TypeMismatch {
    /// Parse `validation error on field '<f>': expected <type>` out of a row message.
    pub fn parse(message: &str) -> Option<Self> {
        TYPE_MISMATCH_PATTERN.captures(message).map(|caps| TypeMismatch {
            field: caps[1].to_string(),
            expected: caps[2].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_type_mismatch() {
        let msg = "record 5: validation error on field 'amount': expected number";
        let mismatch = TypeMismatch::parse(msg).unwrap();
        assert_eq!(mismatch.field, "amount");
        assert_eq!(mismatch.expected, "number");
        assert!(TypeMismatch::parse("record 5: duplicate key").is_none());
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            ErrorKind::classify("field 'x': expected boolean"),
            ErrorKind::TypeBoolean
        );
        assert_eq!(
            ErrorKind::classify("Data too long for column 'notes'"),
            ErrorKind::DataTooLong
        );
        assert_eq!(
            ErrorKind::classify("API Error 401: Unauthorized"),
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorKind::classify("operation timed out"),
            ErrorKind::Timeout
        );
        assert_eq!(ErrorKind::classify("boom"), ErrorKind::Other);
        assert_eq!(ErrorKind::classify_row("boom"), ErrorKind::BulkValidation);
        assert_eq!(ErrorKind::TypeNumber.to_string(), "type:number");
    }
}
