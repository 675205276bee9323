// ============================================================
// BATCH LOADER USE CASE
// ============================================================
// Sampling -> Reconciling -> Streaming -> Draining -> Done | Aborted

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::record_mapper::RecordMapper;
use super::schema_reconciler::{downgrade_field, SchemaReconciler};
use super::type_inference::TypeInferencer;
use super::worker_pool::{Job, WorkerPool};
use crate::domain::error::{AppError, Result};
use crate::domain::import::{
    compute_batch_size, Batch, ErrorKind, ImportConfig, LoadReport, LoadState, Record,
    RunStatistics, SchemaPlan, TypeMismatch,
};
use crate::infrastructure::remote::{BackendApi, ConnectionSource};
use crate::infrastructure::source::{DataSource, SourceSample};
use crate::infrastructure::storage::CheckpointStore;
use crate::shared::progress::Progress;

/// Row failures logged per batch; the rest only reach the tallies.
const LOGGED_ROW_ERRORS: usize = 3;

/// Imports one source at a time into the backend behind `source`.
pub struct BatchLoader<S: ConnectionSource> {
    source: Arc<S>,
    config: ImportConfig,
    stats: Arc<RunStatistics>,
    cancel: CancellationToken,
}

impl<S: ConnectionSource> BatchLoader<S> {
    pub fn new(
        source: Arc<S>,
        config: ImportConfig,
        stats: Arc<RunStatistics>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            config,
            stats,
            cancel,
        }
    }

    /// Run the whole state machine for one source. Never fails: problems
    /// end in `LoadState::Aborted` with a reason on the report.
    pub async fn load(&self, object: &str, data: &DataSource, checkpoint: &CheckpointStore) -> LoadReport {
        let mut report = LoadReport::new(object);
        info!(object = %object, source = %data.path().display(), "Starting import");

        let (sample, estimated_total) = match self.sample(data).await {
            Ok(sampled) => sampled,
            Err(e) => {
                error!(object = %object, error = %e, "Sampling failed");
                return abort(report, e.to_string());
            }
        };
        for (header, earlier) in &sample.headers.duplicates {
            warn!(object = %object, header = %header, earlier = %earlier, "Duplicate header, later column wins");
        }
        for (original, truncated) in &sample.headers.truncated {
            warn!(object = %object, header = %original, name = %truncated, "Header truncated");
        }

        let mut plan = TypeInferencer::new(self.config.clone()).plan(&sample);
        if self.config.dry_run {
            log_plan(object, &plan);
            transition(&mut report, LoadState::Done);
            return report;
        }

        transition(&mut report, LoadState::Reconciling);
        let reconciler = SchemaReconciler::new(self.source.as_ref(), self.config.concurrency);
        if let Err(e) = reconciler.ensure_object(object).await {
            error!(object = %object, error = %e, "Object creation failed, skipping source");
            return abort(report, e.to_string());
        }
        let outcomes = reconciler.ensure_fields(object, &plan.fields).await;
        plan.apply_outcomes(&outcomes);

        transition(&mut report, LoadState::Streaming);
        let start_row = checkpoint.load();
        if start_row > 0 {
            info!(object = %object, start_row, "Resuming from checkpoint");
        }

        let batch_size = compute_batch_size(
            self.config.batch_size,
            self.config.payload_ceiling,
            sample.headers.column_count(),
        );
        debug!(object = %object, batch_size, "Computed batch size");

        let ctx = Arc::new(LoadContext {
            object: object.to_string(),
            stats: self.stats.clone(),
            cancel: self.cancel.clone(),
            in_flight: Mutex::new(BTreeSet::new()),
            started: Instant::now(),
            estimated_total,
            skipped_rows: start_row,
            progress_every: self.config.progress_every,
            completed_rows: AtomicUsize::new(0),
            success: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
        });
        let mapper = RecordMapper::new(object, &sample.headers, &plan.type_map(), &self.config);

        let pool: WorkerPool<BatchJob> =
            WorkerPool::start(self.source.as_ref(), self.config.concurrency, self.config.concurrency);
        let produced = match pool.sender() {
            Some(sender) => {
                let producer = Producer {
                    data: data.clone(),
                    mapper,
                    ctx: ctx.clone(),
                    sender,
                    checkpoint: checkpoint.clone(),
                    start_row,
                    batch_size,
                    checkpoint_interval: self.config.checkpoint_interval,
                };
                tokio::task::spawn_blocking(move || producer.run())
                    .await
                    .unwrap_or_else(|e| ProducerReport::failed(start_row, AppError::Internal(e.to_string())))
            }
            None => ProducerReport::failed(start_row, AppError::Internal("Worker pool closed".to_string())),
        };

        transition(&mut report, LoadState::Draining);
        pool.drain().await;

        report.rows_read = produced.rows_read;
        report.rows_skipped = produced.rows_skipped;
        report.batches_submitted = produced.batches_submitted;
        report.success_count = ctx.success.load(Ordering::SeqCst);
        report.error_count = ctx.failed.load(Ordering::SeqCst);
        report.interrupted = produced.interrupted;
        self.stats
            .record_rows_seen(produced.rows_read.saturating_sub(produced.rows_skipped));

        if let Some(e) = produced.error {
            save_checkpoint(checkpoint, produced.resume_row);
            error!(object = %object, error = %e, "Source read failed");
            return abort(report, e.to_string());
        }
        if produced.interrupted {
            save_checkpoint(checkpoint, produced.resume_row);
            warn!(object = %object, resume_row = produced.resume_row, "Import interrupted");
            return abort(report, "Interrupted by shutdown signal");
        }

        if let Err(e) = checkpoint.clear() {
            warn!(object = %object, error = %e, "Failed to clear checkpoint");
        }
        transition(&mut report, LoadState::Done);
        info!(
            object = %object,
            success = report.success_count,
            failed = report.error_count,
            batches = report.batches_submitted,
            "Import finished"
        );
        report
    }

    async fn sample(&self, data: &DataSource) -> Result<(SourceSample, usize)> {
        let path = data.path().display().to_string();
        let data = data.clone();
        let limit = self.config.sample_size;
        let mode = self.config.sampling;
        let (sample, estimate) = tokio::task::spawn_blocking(move || {
            data.sample(limit, mode).map(|sample| (sample, data.estimate_rows()))
        })
        .await
        .map_err(|e| AppError::Internal(format!("Sampling task failed: {}", e)))??;

        if sample.rows.is_empty() {
            return Err(AppError::SourceError(format!("No data rows in {}", path)));
        }
        Ok((sample, estimate))
    }
}

fn transition(report: &mut LoadReport, next: LoadState) {
    debug_assert!(
        report.state.can_transition_to(next),
        "illegal transition {} -> {}",
        report.state,
        next
    );
    debug!(object = %report.object, from = %report.state, to = %next, "Load state");
    report.state = next;
}

fn abort(report: LoadReport, reason: impl Into<String>) -> LoadReport {
    let reason = reason.into();
    debug!(object = %report.object, from = %report.state, reason = %reason, "Load aborted");
    report.aborted(reason)
}

fn log_plan(object: &str, plan: &SchemaPlan) {
    info!(object = %object, fields = plan.fields.len(), "Dry run, schema plan only");
    for field in &plan.fields {
        info!(object = %object, field = %field.api_name, field_type = %field.field_type, "Planned field");
    }
}

fn save_checkpoint(checkpoint: &CheckpointStore, offset: usize) {
    match checkpoint.advance(offset) {
        Ok(saved) => debug!(path = %checkpoint.path().display(), saved, "Checkpoint saved"),
        Err(e) => warn!(path = %checkpoint.path().display(), error = %e, "Failed to save checkpoint"),
    }
}

/// State shared by the producer and every batch job of one load.
struct LoadContext {
    object: String,
    stats: Arc<RunStatistics>,
    cancel: CancellationToken,
    /// `first_row` of every submitted batch that has not completed
    in_flight: Mutex<BTreeSet<usize>>,
    started: Instant,
    estimated_total: usize,
    skipped_rows: usize,
    progress_every: usize,
    completed_rows: AtomicUsize,
    success: AtomicUsize,
    failed: AtomicUsize,
}

impl LoadContext {
    fn in_flight(&self) -> std::sync::MutexGuard<'_, BTreeSet<usize>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lowest row that may not be imported yet.
    fn low_watermark(&self, pending_first: Option<usize>, next_row: usize) -> usize {
        let oldest = self.in_flight().iter().next().copied();
        [oldest, pending_first, Some(next_row)]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(next_row)
    }

    fn finish(&self, batch: &Batch, success: usize, failed: usize) {
        self.in_flight().remove(&batch.first_row);
        self.success.fetch_add(success, Ordering::SeqCst);
        self.failed.fetch_add(failed, Ordering::SeqCst);

        let rows = batch.end_row - batch.first_row;
        let before = self.completed_rows.fetch_add(rows, Ordering::SeqCst);
        let after = before + rows;
        let every = self.progress_every.max(1);
        if after / every > before / every {
            let progress = Progress {
                processed: self.skipped_rows + after,
                estimated_total: self.estimated_total,
                elapsed: self.started.elapsed(),
            };
            info!(
                object = %self.object,
                "{} {}% | ok {} | failed {} | ETA {}",
                progress.bar(),
                progress.percent(),
                self.success.load(Ordering::SeqCst),
                self.failed.load(Ordering::SeqCst),
                progress.eta_label()
            );
        }
    }
}

struct ProducerReport {
    rows_read: usize,
    rows_skipped: usize,
    batches_submitted: usize,
    interrupted: bool,
    /// Where the next run should start once every submitted batch has finished
    resume_row: usize,
    error: Option<AppError>,
}

impl ProducerReport {
    fn failed(resume_row: usize, error: AppError) -> Self {
        Self {
            rows_read: 0,
            rows_skipped: 0,
            batches_submitted: 0,
            interrupted: false,
            resume_row,
            error: Some(error),
        }
    }
}

/// Reads the source on a blocking thread and feeds full batches to the pool.
struct Producer {
    data: DataSource,
    mapper: RecordMapper,
    ctx: Arc<LoadContext>,
    sender: mpsc::Sender<BatchJob>,
    checkpoint: CheckpointStore,
    start_row: usize,
    batch_size: usize,
    checkpoint_interval: usize,
}

impl Producer {
    fn run(mut self) -> ProducerReport {
        let mut report = ProducerReport {
            rows_read: 0,
            rows_skipped: 0,
            batches_submitted: 0,
            interrupted: false,
            resume_row: self.start_row,
            error: None,
        };
        let rows = match self.data.rows() {
            Ok(rows) => rows,
            Err(e) => {
                report.error = Some(e);
                return report;
            }
        };

        let mut pending: Vec<Record> = Vec::with_capacity(self.batch_size);
        let mut first_row = self.start_row;
        let mut since_checkpoint = 0usize;
        let mut next_row = 0usize;

        for (row_index, row) in rows.enumerate() {
            next_row = row_index;
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    report.error = Some(e);
                    break;
                }
            };
            report.rows_read += 1;
            if row_index < self.start_row {
                report.rows_skipped += 1;
                next_row = row_index + 1;
                continue;
            }

            if pending.is_empty() {
                if self.ctx.cancel.is_cancelled() {
                    report.interrupted = true;
                    break;
                }
                for field in self.ctx.stats.corrected_fields_for(&self.ctx.object) {
                    self.mapper.downgrade(&field);
                }
                first_row = row_index;
            }

            if let Some(record) = self.mapper.map(&row, row_index) {
                pending.push(record);
            }
            next_row = row_index + 1;

            if pending.len() >= self.batch_size {
                let records = std::mem::take(&mut pending);
                if !self.submit(&mut report, first_row, next_row, records) {
                    break;
                }
            }

            since_checkpoint += 1;
            if since_checkpoint >= self.checkpoint_interval {
                since_checkpoint = 0;
                let pending_first = (!pending.is_empty()).then_some(first_row);
                save_checkpoint(&self.checkpoint, self.ctx.low_watermark(pending_first, next_row));
            }
        }

        if pending.is_empty() {
            report.resume_row = next_row;
        } else if report.error.is_some() {
            report.resume_row = first_row;
        } else {
            let records = std::mem::take(&mut pending);
            if self.submit(&mut report, first_row, next_row, records) {
                report.resume_row = next_row;
            } else {
                report.resume_row = first_row;
            }
        }
        report
    }

    fn submit(&self, report: &mut ProducerReport, first_row: usize, end_row: usize, records: Vec<Record>) -> bool {
        let batch = Batch {
            sequence: report.batches_submitted,
            first_row,
            end_row,
            records,
        };
        self.ctx.in_flight().insert(first_row);
        let job = BatchJob {
            batch,
            ctx: self.ctx.clone(),
        };
        if self.sender.blocking_send(job).is_err() {
            self.ctx.in_flight().remove(&first_row);
            report.error = Some(AppError::Internal("Worker pool stopped accepting batches".to_string()));
            return false;
        }
        report.batches_submitted += 1;
        true
    }
}

struct BatchJob {
    batch: Batch,
    ctx: Arc<LoadContext>,
}

impl BatchJob {
    /// Downgrade every field named in a type mismatch, once per run.
    async fn heal<C: BackendApi>(&self, conn: &mut C, errors: &[String]) {
        let object = &self.ctx.object;
        let fields: BTreeSet<String> = errors
            .iter()
            .filter_map(|message| TypeMismatch::parse(message))
            .map(|mismatch| mismatch.field)
            .collect();

        for field in fields {
            if !self.ctx.stats.claim_correction(object, &field) {
                continue;
            }
            match downgrade_field(conn, object, &field).await {
                Ok(()) => {
                    self.ctx.stats.confirm_correction(object, &field);
                    warn!(object = %object, field = %field, "Auto-corrected field to LongTextArea");
                }
                Err(e) => {
                    self.ctx.stats.release_correction(object, &field);
                    error!(object = %object, field = %field, error = %e, "Field downgrade failed");
                }
            }
        }
    }
}

#[async_trait]
impl<C: BackendApi> Job<C> for BatchJob {
    async fn execute(self, conn: &mut C) {
        let total = self.batch.len();
        let stats = &self.ctx.stats;
        let (success, failed) = match conn.bulk_insert(&self.ctx.object, &self.batch.records).await {
            Ok(outcome) => {
                stats.record_batch(total, outcome.success_count, outcome.failed_count);
                for message in &outcome.errors {
                    stats.record_error(ErrorKind::classify_row(message), 1);
                }
                for message in outcome.errors.iter().take(LOGGED_ROW_ERRORS) {
                    warn!(
                        object = %self.ctx.object,
                        batch = self.batch.sequence,
                        error = %message,
                        "Row rejected"
                    );
                }
                if !outcome.errors.is_empty() {
                    self.heal(conn, &outcome.errors).await;
                }
                (outcome.success_count, outcome.failed_count)
            }
            Err(e) => {
                error!(
                    object = %self.ctx.object,
                    batch = self.batch.sequence,
                    records = total,
                    error = %e,
                    "Batch failed"
                );
                stats.record_batch(total, 0, total);
                stats.record_error(ErrorKind::classify(&e.to_string()), 1);
                (0, total)
            }
        };

        self.ctx.finish(&self.batch, success, failed);
        if self.ctx.cancel.is_cancelled() {
            debug!(object = %self.ctx.object, batch = self.batch.sequence, "Batch finished after shutdown request");
        }
    }
}
