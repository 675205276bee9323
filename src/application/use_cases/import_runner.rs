// ============================================================
// IMPORT RUNNER USE CASE
// ============================================================
// Discover sources, order them, and import each one in turn

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::batch_loader::BatchLoader;
use crate::domain::error::{AppError, Result};
use crate::domain::import::{LoadReport, LoadState, RunStatistics};
use crate::infrastructure::config::Settings;
use crate::infrastructure::remote::ConnectionSource;
use crate::infrastructure::source::DataSource;
use crate::infrastructure::storage::{CheckpointStore, StatsLog};

/// One source file or dataset and the object it loads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportJob {
    pub object: String,
    pub path: PathBuf,
}

/// Object name from a file stem: lower-case, non-alphanumerics become `_`.
pub fn object_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    stem.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| {
            let name = n.to_string_lossy();
            name.starts_with('.') || name.starts_with('_')
        })
        .unwrap_or(true)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Every `*.csv` / `*.parquet` file and non-hidden sub-directory of `dir`.
pub fn discover_dir(dir: &Path) -> Result<Vec<ImportJob>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppError::SourceError(format!("Cannot read data dir {}: {}", dir.display(), e))
    })?;
    let mut jobs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if is_hidden(&path) {
            continue;
        }
        if path.is_dir() || has_extension(&path, "csv") || has_extension(&path, "parquet") {
            jobs.push(ImportJob {
                object: object_name_for(&path),
                path,
            });
        }
    }
    Ok(jobs)
}

/// Explicit sources first, then anything found in `data_dir` whose object
/// is not already claimed.
pub fn collect_jobs(settings: &Settings) -> Result<Vec<ImportJob>> {
    let mut jobs: Vec<ImportJob> = settings
        .sources
        .iter()
        .map(|spec| ImportJob {
            object: spec
                .object
                .clone()
                .unwrap_or_else(|| object_name_for(&spec.path)),
            path: spec.path.clone(),
        })
        .collect();

    if let Some(dir) = &settings.data_dir {
        let mut claimed: HashSet<String> = jobs.iter().map(|j| j.object.clone()).collect();
        for job in discover_dir(dir)? {
            if claimed.insert(job.object.clone()) {
                jobs.push(job);
            } else {
                warn!(object = %job.object, path = %job.path.display(), "Object already has a source, skipping");
            }
        }
    }
    Ok(jobs)
}

/// Priority objects first in list order, the rest by name.
pub fn order_jobs(mut jobs: Vec<ImportJob>, priority: &[String]) -> Vec<ImportJob> {
    jobs.sort_by(|a, b| {
        let rank = |job: &ImportJob| {
            priority
                .iter()
                .position(|p| p == &job.object)
                .unwrap_or(priority.len())
        };
        rank(a).cmp(&rank(b)).then_with(|| a.object.cmp(&b.object))
    });
    jobs
}

pub struct ImportRunner<S: ConnectionSource> {
    loader: BatchLoader<S>,
    settings: Settings,
    stats: Arc<RunStatistics>,
    cancel: CancellationToken,
}

impl<S: ConnectionSource> ImportRunner<S> {
    pub fn new(
        source: Arc<S>,
        settings: Settings,
        stats: Arc<RunStatistics>,
        cancel: CancellationToken,
    ) -> Self {
        let loader = BatchLoader::new(source, settings.import.clone(), stats.clone(), cancel.clone());
        Self {
            loader,
            settings,
            stats,
            cancel,
        }
    }

    /// Import every configured source. A failing source never stops the
    /// others; only an empty or unreadable source list is an error.
    pub async fn run(&self) -> Result<Vec<LoadReport>> {
        let jobs = order_jobs(collect_jobs(&self.settings)?, &self.settings.priority);
        if jobs.is_empty() {
            return Err(AppError::ConfigError(
                "No sources configured: set `sources` or `data_dir`".to_string(),
            ));
        }
        info!(sources = jobs.len(), "Import plan ready");

        let stats_log = StatsLog::new(self.settings.stats_file.clone());
        let mut reports = Vec::with_capacity(jobs.len());
        for job in jobs {
            if self.cancel.is_cancelled() {
                warn!(object = %job.object, "Shutdown requested, not starting remaining sources");
                break;
            }
            let report = self.run_job(&job).await;
            if report.state == LoadState::Done || report.interrupted {
                self.stats.record_object();
            }
            if report.state == LoadState::Done && !self.settings.import.dry_run {
                let total = report.success_count + report.error_count;
                if let Err(e) = stats_log.append(&job.object, total, report.success_count, report.error_count) {
                    warn!(object = %job.object, error = %e, "Failed to append stats line");
                }
            }
            reports.push(report);
        }
        Ok(reports)
    }

    async fn run_job(&self, job: &ImportJob) -> LoadReport {
        let path = job.path.clone();
        let opened = tokio::task::spawn_blocking(move || DataSource::open(&path))
            .await
            .map_err(|e| AppError::Internal(e.to_string()))
            .and_then(|r| r);
        let data = match opened {
            Ok(data) => data,
            Err(e) => {
                error!(object = %job.object, path = %job.path.display(), error = %e, "Cannot open source");
                return LoadReport::new(&job.object).aborted(e.to_string());
            }
        };
        let checkpoint = CheckpointStore::for_object(&self.settings.state_dir, &job.object);
        self.loader.load(&job.object, &data, &checkpoint).await
    }
}
