// ============================================================
// IMPORT CONFIGURATION
// ============================================================
// Tunables for sampling, inference, batching and checkpointing

use serde::{Deserialize, Serialize};
use validator::Validate;

/// How rows are picked for inference when `sample_size` is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Seek to evenly spaced byte offsets and read a run of rows at each
    #[default]
    Distributed,
    /// Count rows first, then keep every k-th row
    Stratified,
}

/// Configuration for one import run
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ImportConfig {
    /// Rows sampled for type inference (default: 5000). 0 means full scan.
    pub sample_size: usize,

    /// Row selection strategy for non-zero sample sizes
    pub sampling: SamplingMode,

    /// Requested rows per bulk call (default: 1000)
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// Worker count for field creation and batch submission (default: 20)
    #[validate(range(min = 1, max = 256))]
    pub concurrency: usize,

    /// Backend placeholder budget per request (default: 50000).
    /// Rows per batch never exceed `payload_ceiling / column_count`.
    #[validate(range(min = 1))]
    pub payload_ceiling: usize,

    /// Source rows between checkpoint writes (default: 5000)
    #[validate(range(min = 1))]
    pub checkpoint_interval: usize,

    /// Fraction of non-blank samples that must match a pattern (default: 0.99)
    #[validate(range(min = 0.0, max = 1.0))]
    pub match_threshold: f64,

    /// Require every distinct boolean value to come from one canonical pair
    pub strict_boolean: bool,

    /// Cell values treated as absent, compared case-insensitively after trimming
    pub null_markers: Vec<String>,

    /// Longest sample value still accepted as a reference key (default: 36)
    #[validate(range(min = 1))]
    pub reference_max_len: usize,

    /// Truncation length for a synthesized record name (default: 255)
    #[validate(range(min = 1))]
    pub max_name_len: usize,

    /// Infer and report the schema plan without touching the backend
    pub dry_run: bool,

    /// Attach a deterministic `import_key` to every record
    pub idempotency_keys: bool,

    /// Completed rows between progress log lines (default: 1000)
    #[validate(range(min = 1))]
    pub progress_every: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            sample_size: 5000,
            sampling: SamplingMode::Distributed,
            batch_size: 1000,
            concurrency: 20,
            payload_ceiling: 50_000,
            checkpoint_interval: 5000,
            match_threshold: 0.99,
            strict_boolean: false,
            null_markers: default_null_markers(),
            reference_max_len: 36,
            max_name_len: 255,
            dry_run: false,
            idempotency_keys: false,
            progress_every: 1000,
        }
    }
}

fn default_null_markers() -> Vec<String> {
    ["n/a", "#n/a", "null", "nil"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

impl ImportConfig {
    /// Whether a raw cell counts as absent.
    pub fn is_null_marker(&self, value: &str) -> bool {
        let trimmed = value.trim();
        self.null_markers
            .iter()
            .any(|m| m.eq_ignore_ascii_case(trimmed))
    }

    /// Validate configuration values
    pub fn validate_ranges(&self) -> Result<(), String> {
        self.validate().map_err(|e| e.to_string())?;
        if !self.match_threshold.is_finite() {
            return Err("match_threshold must be a finite number".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ImportConfig::default().validate_ranges().is_ok());
    }

    #[test]
    fn test_null_markers_are_case_insensitive() {
        let config = ImportConfig::default();
        assert!(config.is_null_marker(" N/A "));
        assert!(config.is_null_marker("NULL"));
        assert!(!config.is_null_marker("none of these"));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let config = ImportConfig {
            match_threshold: 1.5,
            ..Default::default()
        };
        assert!(config.validate_ranges().is_err());

        let config = ImportConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate_ranges().is_err());
    }
}
