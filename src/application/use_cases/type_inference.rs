// ============================================================
// TYPE INFERENCE USE CASE
// ============================================================
// Propose one field type per column from its name and sampled values

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::import::{
    ColumnProfile, FieldDefinition, FieldType, ImportConfig, SchemaPlan,
};
use crate::infrastructure::source::SourceSample;

/// Column holding the optional per-row idempotency key.
pub const IMPORT_KEY_FIELD: &str = "import_key";

const PHONE_INDICATORS: [&str; 3] = ["phone", "mobile", "fax"];

/// Name fragments that mark a column as free text whatever its values look like.
pub const TEXT_FIELD_INDICATORS: [&str; 24] = [
    "name", "title", "desc", "subject", "note", "comment", "street", "city", "state", "zip",
    "country", "phone", "email", "url", "link", "status", "type", "code", "address", "message",
    "body", "content", "text", "label",
];

const BOOLEAN_TERMS: [&str; 10] = ["true", "false", "1", "0", "yes", "no", "y", "n", "t", "f"];

const BOOLEAN_PAIRS: [[&str; 2]; 5] = [
    ["true", "false"],
    ["1", "0"],
    ["yes", "no"],
    ["y", "n"],
    ["t", "f"],
];

static DATE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^\d{4}-\d{2}-\d{2}",
        r"^\d{4}/\d{2}/\d{2}",
        r"^\d{4}\.\d{2}\.\d{2}",
        r"^\d{1,2}/\d{1,2}/\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static NUMBER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d*\.?\d+([eE][-+]?\d+)?$").unwrap());

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").unwrap());

/// Longest digit run still treated as a quantity rather than an identifier.
const MAX_NUMBER_DIGITS: usize = 15;

/// Deterministic type inference with a dirty-data tolerance.
pub struct TypeInferencer {
    config: ImportConfig,
}

impl TypeInferencer {
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }

    /// Infer a type for one column. Checks run in a fixed order and the
    /// first match wins; `Text` is the fallback.
    pub fn infer(&self, column_name: &str, samples: &[String]) -> FieldType {
        let values: Vec<&str> = samples
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && !self.config.is_null_marker(v))
            .collect();
        if values.is_empty() {
            return FieldType::Text;
        }

        let name = column_name.trim().to_lowercase();
        if is_textual_name(&name) {
            return FieldType::Text;
        }

        if self.is_boolean(&values) {
            return FieldType::Boolean;
        }
        if self.meets_threshold(&values, is_date) {
            return FieldType::DateTime;
        }
        if !is_identifier_name(&name) && self.meets_threshold(&values, is_number) {
            return FieldType::Number;
        }
        if self.meets_threshold(&values, |v| EMAIL_PATTERN.is_match(v)) {
            return FieldType::Email;
        }
        if self.meets_threshold(&values, |v| URL_PATTERN.is_match(v)) {
            return FieldType::Url;
        }

        if let Some(target) = name.strip_suffix("_id") {
            let max_len = values.iter().map(|v| v.chars().count()).max().unwrap_or(0);
            if !target.is_empty() && max_len <= self.config.reference_max_len {
                return FieldType::Reference(target.to_string());
            }
        }

        FieldType::Text
    }

    pub fn infer_profile(&self, profile: &ColumnProfile) -> FieldType {
        self.infer(&profile.name, &profile.values)
    }

    /// Schema plan for a sampled source. Types declared by the source win
    /// over inference, except on columns whose name marks them as text.
    pub fn plan(&self, sample: &SourceSample) -> SchemaPlan {
        let mut fields: Vec<FieldDefinition> = ColumnProfile::from_rows(&sample.headers, &sample.rows)
            .into_iter()
            .map(|profile| {
                let declared = if is_textual_name(&profile.name.trim().to_lowercase()) {
                    None
                } else {
                    sample.declared_type(&profile.name)
                };
                let field_type = declared.unwrap_or_else(|| self.infer_profile(&profile));
                debug!(column = %profile.name, field_type = %field_type, "Inferred column type");
                FieldDefinition::new(profile.name, profile.label, field_type)
            })
            .collect();

        if self.config.idempotency_keys && !sample.headers.contains(IMPORT_KEY_FIELD) {
            fields.push(FieldDefinition::new(IMPORT_KEY_FIELD, "Import Key", FieldType::Text));
        }

        SchemaPlan { fields }
    }

    fn meets_threshold<F>(&self, values: &[&str], matches: F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let hits = values.iter().filter(|v| matches(v)).count();
        hits as f64 / values.len() as f64 >= self.config.match_threshold
    }

    fn is_boolean(&self, values: &[&str]) -> bool {
        if self.config.strict_boolean {
            let mut distinct: Vec<String> = values.iter().map(|v| v.to_lowercase()).collect();
            distinct.sort();
            distinct.dedup();
            return BOOLEAN_PAIRS
                .iter()
                .any(|pair| distinct.iter().all(|v| pair.contains(&v.as_str())));
        }
        self.meets_threshold(values, |v| BOOLEAN_TERMS.contains(&v.to_lowercase().as_str()))
    }
}

fn is_textual_name(name: &str) -> bool {
    PHONE_INDICATORS.iter().any(|i| name.contains(i))
        || TEXT_FIELD_INDICATORS.iter().any(|i| name.contains(i))
}

/// Identifier-like names never become numbers.
fn is_identifier_name(name: &str) -> bool {
    name.ends_with("_id") || name.contains("_id_")
}

fn is_date(value: &str) -> bool {
    DATE_PATTERNS.iter().any(|p| p.is_match(value))
}

/// Strip currency and thousands decorations from a numeric string.
pub fn strip_number_decorations(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '£' | '€'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_number(value: &str) -> bool {
    let cleaned = strip_number_decorations(value);
    let digits = cleaned
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | 'e' | 'E' | '+'))
        .count();
    digits <= MAX_NUMBER_DIGITS && NUMBER_PATTERN.is_match(&cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::HeaderSet;

    fn inferencer() -> TypeInferencer {
        TypeInferencer::new(ImportConfig::default())
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn repeated(value: &str, n: usize) -> Vec<String> {
        vec![value.to_string(); n]
    }

    #[test]
    fn test_blank_samples_default_to_text() {
        assert_eq!(inferencer().infer("amount", &strings(&["", "  "])), FieldType::Text);
        assert_eq!(inferencer().infer("amount", &[]), FieldType::Text);
    }

    #[test]
    fn test_phone_names_stay_text() {
        let samples = strings(&["5551234567", "5559876543"]);
        assert_eq!(inferencer().infer("mobile_phone", &samples), FieldType::Text);
        assert_eq!(inferencer().infer("Fax", &samples), FieldType::Text);
        assert_eq!(inferencer().infer("zip", &strings(&["02134"])), FieldType::Text);
    }

    #[test]
    fn test_threshold_tolerance_for_each_family() {
        let cases: [(&str, &str, FieldType); 5] = [
            ("is_active", "true", FieldType::Boolean),
            ("created", "2024-01-15", FieldType::DateTime),
            ("amount", "1,500.25", FieldType::Number),
            ("contact", "a@b.co", FieldType::Email),
            ("website", "https://example.com", FieldType::Url),
        ];
        for (column, clean, expected) in cases {
            let mut at_threshold = repeated(clean, 99);
            at_threshold.push("garbage value".to_string());
            assert_eq!(inferencer().infer(column, &at_threshold), expected, "{}", column);

            let mut below = repeated(clean, 98);
            below.extend(repeated("garbage value", 2));
            assert_eq!(inferencer().infer(column, &below), FieldType::Text, "{}", column);
        }
    }

    #[test]
    fn test_dirty_numbers_fall_back_to_text() {
        let mut samples = repeated("123", 96);
        samples.extend(repeated("unknown", 4));
        assert_eq!(inferencer().infer("amount", &samples), FieldType::Text);
    }

    #[test]
    fn test_long_digit_runs_are_not_numbers() {
        let samples = strings(&["1234567890123456"]);
        assert_eq!(inferencer().infer("external_ref", &samples), FieldType::Text);
        assert_eq!(inferencer().infer("quantity", &strings(&["-1.5e3", "$20"])), FieldType::Number);
    }

    #[test]
    fn test_id_suffix_becomes_reference_within_length_bound() {
        let ids = strings(&["0035000000abcde123", "0035000000abcde124"]);
        assert_eq!(
            inferencer().infer("account_id", &ids),
            FieldType::Reference("account".to_string())
        );

        let numeric = strings(&["101", "102"]);
        assert_eq!(
            inferencer().infer("owner_id", &numeric),
            FieldType::Reference("owner".to_string())
        );

        let exactly_36 = vec!["a".repeat(36)];
        assert!(inferencer().infer("account_id", &exactly_36).is_reference());

        let mut too_long = ids.clone();
        too_long.push("a".repeat(37));
        assert_eq!(inferencer().infer("account_id", &too_long), FieldType::Text);
    }

    #[test]
    fn test_embedded_id_is_never_number() {
        let samples = strings(&["42", "43"]);
        assert_eq!(inferencer().infer("external_id_c", &samples), FieldType::Text);
    }

    #[test]
    fn test_strict_boolean_rejects_mixed_pairs() {
        let strict = TypeInferencer::new(ImportConfig {
            strict_boolean: true,
            ..Default::default()
        });
        assert_eq!(strict.infer("flag", &strings(&["yes", "no", "YES"])), FieldType::Boolean);
        assert_eq!(strict.infer("flag", &strings(&["true", "1"])), FieldType::Text);
        assert_eq!(inferencer().infer("flag", &strings(&["true", "1"])), FieldType::Boolean);
    }

    #[test]
    fn test_small_sample_with_null_marker_and_dirty_value() {
        let headers = HeaderSet::new(strings(&["name", "created_date", "amount"]));
        let sample = SourceSample {
            headers,
            rows: vec![
                strings(&["Acme", "2024-01-15", "1500"]),
                strings(&["Globex", "2024-02-01", "2300.50"]),
                strings(&["Initech", "N/A", "bad"]),
            ],
            declared: Vec::new(),
        };
        let types = inferencer().plan(&sample).type_map();
        assert_eq!(types["name"], FieldType::Text);
        assert_eq!(types["created_date"], FieldType::DateTime);
        assert_eq!(types["amount"], FieldType::Text);
    }

    #[test]
    fn test_plan_prefers_declared_types_and_adds_import_key() {
        let headers = HeaderSet::new(strings(&["score", "label"]));
        let sample = SourceSample {
            headers,
            rows: vec![strings(&["not numeric", "x"])],
            declared: vec![Some(FieldType::Number), None],
        };
        let inferencer = TypeInferencer::new(ImportConfig {
            idempotency_keys: true,
            ..Default::default()
        });
        let plan = inferencer.plan(&sample);
        assert_eq!(plan.get("score").unwrap().field_type, FieldType::Number);
        assert_eq!(plan.get(IMPORT_KEY_FIELD).unwrap().field_type, FieldType::Text);
        assert_eq!(plan.fields.len(), 3);
    }

    #[test]
    fn test_textual_names_override_declared_numbers() {
        let headers = HeaderSet::new(strings(&["mobile_phone", "zip", "amount"]));
        let sample = SourceSample {
            headers,
            rows: vec![
                strings(&["5551234567", "90210", "12"]),
                strings(&["5559876543", "10001", "40"]),
            ],
            declared: vec![
                Some(FieldType::Number),
                Some(FieldType::Number),
                Some(FieldType::Number),
            ],
        };
        let plan = inferencer().plan(&sample);
        assert_eq!(plan.get("mobile_phone").unwrap().field_type, FieldType::Text);
        assert_eq!(plan.get("zip").unwrap().field_type, FieldType::Text);
        assert_eq!(plan.get("amount").unwrap().field_type, FieldType::Number);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let samples = strings(&["2024-01-01", "1/2/2024", "2024.03.04"]);
        let first = inferencer().infer("when", &samples);
        let second = inferencer().infer("when", &samples);
        assert_eq!(first, second);
        assert_eq!(first, FieldType::DateTime);
    }
}
