// ============================================================
// RUN STATISTICS
// ============================================================
// Counters shared by every worker for one process invocation

use super::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Counters {
    rows_seen: usize,
    total_rows: usize,
    success_count: usize,
    error_count: usize,
    auto_corrections: usize,
    objects_processed: usize,
    corrected_fields: BTreeSet<String>,
    pending_corrections: HashSet<String>,
    errors_by_kind: HashMap<ErrorKind, usize>,
}

/// Statistics for one run. Passed explicitly to the loader and its workers;
/// every update goes through the same lock.
#[derive(Debug)]
pub struct RunStatistics {
    started_at: Instant,
    counters: Mutex<Counters>,
}

impl Default for RunStatistics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStatistics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_object(&self) {
        self.lock().objects_processed += 1;
    }

    pub fn record_rows_seen(&self, rows: usize) {
        self.lock().rows_seen += rows;
    }

    /// Account for one finished batch.
    pub fn record_batch(&self, total: usize, success: usize, failed: usize) {
        let mut c = self.lock();
        c.total_rows += total;
        c.success_count += success;
        c.error_count += failed;
    }

    pub fn record_error(&self, kind: ErrorKind, count: usize) {
        if count == 0 {
            return;
        }
        *self.lock().errors_by_kind.entry(kind).or_insert(0) += count;
    }

    /// Reserve the right to downgrade `object.field`. Only the first caller wins
    /// until the claim is released.
    pub fn claim_correction(&self, object: &str, field: &str) -> bool {
        let key = format!("{}.{}", object, field);
        let mut c = self.lock();
        if c.corrected_fields.contains(&key) {
            return false;
        }
        c.pending_corrections.insert(key)
    }

    pub fn confirm_correction(&self, object: &str, field: &str) {
        let key = format!("{}.{}", object, field);
        let mut c = self.lock();
        c.pending_corrections.remove(&key);
        if c.corrected_fields.insert(key) {
            c.auto_corrections += 1;
        }
    }

    pub fn release_correction(&self, object: &str, field: &str) {
        let key = format!("{}.{}", object, field);
        self.lock().pending_corrections.remove(&key);
    }

    /// Fields of `object` already downgraded during this run.
    pub fn corrected_fields_for(&self, object: &str) -> Vec<String> {
        let prefix = format!("{}.", object);
        self.lock()
            .corrected_fields
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = self.lock();
        StatsSnapshot {
            rows_seen: c.rows_seen,
            total_rows: c.total_rows,
            success_count: c.success_count,
            error_count: c.error_count,
            auto_corrections: c.auto_corrections,
            objects_processed: c.objects_processed,
        }
    }

    /// Build the end-of-run report.
    pub fn summary(&self, interrupted: bool) -> ImportSummary {
        let c = self.lock();
        let mut top_errors: Vec<(String, usize)> = c
            .errors_by_kind
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), *v))
            .collect();
        top_errors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        top_errors.truncate(5);

        ImportSummary {
            interrupted,
            duration_secs: self.started_at.elapsed().as_secs_f64(),
            objects_processed: c.objects_processed,
            rows_seen: c.rows_seen,
            total_rows: c.total_rows,
            success_count: c.success_count,
            error_count: c.error_count,
            auto_corrections: c.auto_corrections,
            corrected_fields: c.corrected_fields.iter().cloned().collect(),
            top_errors,
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub rows_seen: usize,
    pub total_rows: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub auto_corrections: usize,
    pub objects_processed: usize,
}

/// Final report for a run, printed whether or not it completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSummary {
    pub interrupted: bool,
    pub duration_secs: f64,
    pub objects_processed: usize,
    pub rows_seen: usize,
    pub total_rows: usize,
    pub success_count: usize,
    pub error_count: usize,
    pub auto_corrections: usize,
    pub corrected_fields: Vec<String>,
    pub top_errors: Vec<(String, usize)>,
}

impl ImportSummary {
    pub fn rows_per_second(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.total_rows as f64 / self.duration_secs
        } else {
            0.0
        }
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.error_count;
        if total > 0 {
            self.success_count as f64 / total as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        if self.interrupted {
            writeln!(f, "IMPORT SUMMARY (PARTIAL - run was interrupted)")?;
        } else {
            writeln!(f, "IMPORT SUMMARY")?;
        }
        writeln!(f, "{}", rule)?;
        writeln!(f, "  Duration:         {:.1}s", self.duration_secs)?;
        writeln!(f, "  Objects:          {}", self.objects_processed)?;
        writeln!(f, "  Rows Read:        {}", self.rows_seen)?;
        writeln!(f, "  Total Rows:       {}", self.total_rows)?;
        writeln!(
            f,
            "  Success:          {} ({:.1}%)",
            self.success_count,
            self.success_rate()
        )?;
        writeln!(f, "  Errors:           {}", self.error_count)?;
        writeln!(f, "  Auto-Corrections: {}", self.auto_corrections)?;
        writeln!(f, "  Throughput:       {:.0} rows/sec", self.rows_per_second())?;
        if !self.corrected_fields.is_empty() {
            writeln!(f, "\n  Corrected Fields:")?;
            for field in &self.corrected_fields {
                writeln!(f, "     - {}", field)?;
            }
        }
        if !self.top_errors.is_empty() {
            writeln!(f, "\n  Errors by Type:")?;
            for (kind, count) in &self.top_errors {
                writeln!(f, "     - {}: {}", kind, count)?;
            }
        }
        write!(f, "{}", rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let stats = Arc::new(RunStatistics::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = stats.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.record_batch(2, 1, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snap = stats.snapshot();
        assert_eq!(snap.total_rows, 16_000);
        assert_eq!(snap.success_count, 8_000);
        assert_eq!(snap.error_count, 8_000);
    }

    #[test]
    fn test_correction_claimed_once() {
        let stats = RunStatistics::new();
        assert!(stats.claim_correction("deal", "amount"));
        assert!(!stats.claim_correction("deal", "amount"));
        stats.release_correction("deal", "amount");
        assert!(stats.claim_correction("deal", "amount"));
        stats.confirm_correction("deal", "amount");
        assert!(!stats.claim_correction("deal", "amount"));
        assert_eq!(stats.corrected_fields_for("deal"), vec!["amount".to_string()]);
        assert!(stats.corrected_fields_for("dealer").is_empty());
        let summary = stats.summary(false);
        assert_eq!(summary.auto_corrections, 1);
        assert_eq!(summary.corrected_fields, vec!["deal.amount".to_string()]);
    }

    #[test]
    fn test_partial_summary_is_marked() {
        let stats = RunStatistics::new();
        stats.record_error(ErrorKind::Timeout, 3);
        stats.record_error(ErrorKind::TypeNumber, 7);
        let summary = stats.summary(true);
        let text = summary.to_string();
        assert!(text.contains("PARTIAL"));
        assert_eq!(summary.top_errors[0], ("type:number".to_string(), 7));
    }
}
