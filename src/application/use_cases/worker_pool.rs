// ============================================================
// WORKER POOL
// ============================================================
// Fixed set of tasks, each owning one backend connection

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::domain::error::{AppError, Result};
use crate::infrastructure::remote::ConnectionSource;

/// A unit of work run on some worker's connection.
#[async_trait]
pub trait Job<C: Send>: Send + 'static {
    async fn execute(self, conn: &mut C);
}

/// Bounded pool. The queue holds at most `capacity` waiting jobs, so
/// submitters block once every worker is busy and the queue is full.
pub struct WorkerPool<J> {
    sender: Option<mpsc::Sender<J>>,
    workers: JoinSet<()>,
}

impl<J: Send + 'static> WorkerPool<J> {
    pub fn start<S>(source: &S, size: usize, capacity: usize) -> Self
    where
        S: ConnectionSource,
        J: Job<S::Conn>,
    {
        let (sender, receiver) = mpsc::channel::<J>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let mut workers = JoinSet::new();

        for worker_id in 0..size.max(1) {
            let receiver = receiver.clone();
            // No socket is opened until the first request.
            let mut conn = source.connect();
            workers.spawn(async move {
                loop {
                    let next = { receiver.lock().await.recv().await };
                    match next {
                        Some(job) => job.execute(&mut conn).await,
                        None => break,
                    }
                }
                debug!(worker_id, "Worker finished");
            });
        }

        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Queue a job, waiting for room if the queue is full.
    pub async fn submit(&self, job: J) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| AppError::Internal("Worker pool already closed".to_string()))?;
        sender
            .send(job)
            .await
            .map_err(|_| AppError::Internal("Worker pool stopped accepting jobs".to_string()))
    }

    /// Handle for submitting from a blocking thread with `blocking_send`.
    pub fn sender(&self) -> Option<mpsc::Sender<J>> {
        self.sender.clone()
    }

    /// Close the queue and wait for every queued and running job to finish.
    pub async fn drain(mut self) {
        self.sender.take();
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Worker task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::{BulkOutcome, FieldDefinition, FieldType, ObjectDefinition, Record};
    use crate::infrastructure::remote::BackendApi;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConn {
        id: usize,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    #[async_trait]
    impl BackendApi for CountingConn {
        async fn get_object(&mut self, _name: &str) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn create_object(&mut self, _def: &ObjectDefinition) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn create_field(&mut self, _object: &str, _field: &FieldDefinition) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn update_field_type(
            &mut self,
            _object: &str,
            _field: &str,
            _field_type: &FieldType,
        ) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn bulk_insert(&mut self, _object: &str, _records: &[Record]) -> Result<BulkOutcome> {
            Ok(BulkOutcome::default())
        }
    }

    struct CountingSource {
        connects: AtomicUsize,
        seen: Arc<Mutex<Vec<usize>>>,
    }

    impl ConnectionSource for CountingSource {
        type Conn = CountingConn;

        fn connect(&self) -> CountingConn {
            CountingConn {
                id: self.connects.fetch_add(1, Ordering::SeqCst),
                seen: self.seen.clone(),
            }
        }
    }

    struct RecordWorker;

    #[async_trait]
    impl Job<CountingConn> for RecordWorker {
        async fn execute(self, conn: &mut CountingConn) {
            tokio::task::yield_now().await;
            conn.seen.lock().await.push(conn.id);
        }
    }

    #[tokio::test]
    async fn test_every_job_runs_on_a_worker_owned_connection() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource {
            connects: AtomicUsize::new(0),
            seen: seen.clone(),
        };
        let pool = WorkerPool::start(&source, 4, 2);
        for _ in 0..50 {
            pool.submit(RecordWorker).await.unwrap();
        }
        pool.drain().await;

        let seen = seen.lock().await;
        assert_eq!(seen.len(), 50);
        assert_eq!(source.connects.load(Ordering::SeqCst), 4);
        assert!(seen.iter().all(|id| *id < 4));
    }

    #[tokio::test]
    async fn test_blocking_submission_from_producer_thread() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let source = CountingSource {
            connects: AtomicUsize::new(0),
            seen: seen.clone(),
        };
        let pool: WorkerPool<RecordWorker> = WorkerPool::start(&source, 2, 1);
        let sender = pool.sender().unwrap();
        tokio::task::spawn_blocking(move || {
            for _ in 0..10 {
                sender.blocking_send(RecordWorker).unwrap();
            }
        })
        .await
        .unwrap();
        pool.drain().await;
        assert_eq!(seen.lock().await.len(), 10);
    }
}
