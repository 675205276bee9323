// ============================================================
// PROGRESS
// ============================================================
// Row-count estimates and progress lines for long imports.
// CSV totals come from the average byte length of the first data lines,
// so percentages stay approximate and below 100 until the source ends.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::Duration;

/// Data lines read to estimate the average row length
pub const ESTIMATE_SAMPLE_LINES: usize = 50;

const BAR_WIDTH: usize = 30;

/// Estimate the number of data rows in a delimited text file.
/// Returns 0 when the file is empty, unreadable or has no data lines.
pub fn estimate_total_rows(path: &Path) -> usize {
    let Ok(file) = File::open(path) else {
        return 0;
    };
    let file_size = file.metadata().map(|m| m.len()).unwrap_or(0);
    if file_size == 0 {
        return 0;
    }

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let header_bytes = match reader.read_until(b'\n', &mut line) {
        Ok(n) => n as u64,
        Err(_) => return 0,
    };

    let mut sample_bytes = 0u64;
    let mut sample_count = 0u64;
    for _ in 0..ESTIMATE_SAMPLE_LINES {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                sample_bytes += n as u64;
                sample_count += 1;
            }
        }
    }

    if sample_count == 0 || sample_bytes == 0 {
        return 0;
    }
    let avg_row_len = sample_bytes as f64 / sample_count as f64;
    (file_size.saturating_sub(header_bytes) as f64 / avg_row_len) as usize
}

/// Progress of one import relative to an estimated total.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub processed: usize,
    pub estimated_total: usize,
    pub elapsed: Duration,
}

impl Progress {
    /// Percent done, capped at 99 while work remains.
    pub fn percent(&self) -> usize {
        if self.estimated_total == 0 {
            return 0;
        }
        (self.processed * 100 / self.estimated_total).min(99)
    }

    pub fn eta(&self) -> Option<Duration> {
        let percent = self.percent();
        if self.processed == 0 || percent == 0 {
            return None;
        }
        let secs = self.elapsed.as_secs_f64() * (100 - percent) as f64 / percent as f64;
        Some(Duration::from_secs_f64(secs))
    }

    pub fn bar(&self) -> String {
        let filled = BAR_WIDTH * self.percent() / 100;
        format!("[{}{}]", "=".repeat(filled), " ".repeat(BAR_WIDTH - filled))
    }

    pub fn eta_label(&self) -> String {
        match self.eta() {
            Some(eta) => {
                let secs = eta.as_secs();
                format!("{}m{}s", secs / 60, secs % 60)
            }
            None => "--".to_string(),
        }
    }
}
