// ============================================================
// SCHEMA RECONCILER USE CASE
// ============================================================
// Make the remote object and its fields match the inferred plan

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::worker_pool::{Job, WorkerPool};
use crate::domain::error::{AppError, Result};
use crate::domain::import::{FieldDefinition, FieldOutcome, FieldStatus, FieldType, ObjectDefinition};
use crate::infrastructure::remote::{BackendApi, ConnectionSource};

pub struct SchemaReconciler<'a, S: ConnectionSource> {
    source: &'a S,
    concurrency: usize,
}

impl<'a, S: ConnectionSource> SchemaReconciler<'a, S> {
    pub fn new(source: &'a S, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    /// Create the object unless a GET finds it. A duplicate rejection on
    /// create counts as success; any other rejection is a `SchemaError`.
    pub async fn ensure_object(&self, name: &str) -> Result<()> {
        let mut conn = self.source.connect();
        match conn.get_object(name).await {
            Ok(_) => {
                debug!(object = %name, "Object already present");
                return Ok(());
            }
            Err(e) => debug!(object = %name, error = %e, "Object lookup failed, creating"),
        }

        info!(object = %name, "Creating object");
        match conn.create_object(&ObjectDefinition::imported(name)).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => Ok(()),
            Err(e) => Err(AppError::SchemaError(format!(
                "Failed to create object {}: {}",
                name, e
            ))),
        }
    }

    /// Create every field concurrently. Outcomes come back in input order.
    pub async fn ensure_fields(&self, object: &str, fields: &[FieldDefinition]) -> Vec<FieldOutcome> {
        if fields.is_empty() {
            return Vec::new();
        }
        info!(object = %object, fields = fields.len(), "Ensuring fields");

        let object: Arc<str> = Arc::from(object);
        let (reply, mut replies) = mpsc::unbounded_channel();
        let pool = WorkerPool::start(self.source, self.concurrency.min(fields.len()), self.concurrency);
        for (position, definition) in fields.iter().enumerate() {
            let job = FieldJob {
                position,
                object: object.clone(),
                definition: definition.clone(),
                reply: reply.clone(),
            };
            if pool.submit(job).await.is_err() {
                break;
            }
        }
        drop(reply);
        pool.drain().await;

        let mut outcomes: Vec<(usize, FieldOutcome)> = Vec::with_capacity(fields.len());
        while let Some(outcome) = replies.recv().await {
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|(position, _)| *position);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

/// Create one field. A rejected reference is retried once as text.
pub async fn ensure_field<C: BackendApi>(
    conn: &mut C,
    object: &str,
    definition: &FieldDefinition,
) -> FieldOutcome {
    let status = match conn.create_field(object, definition).await {
        Ok(_) => FieldStatus::Created,
        Err(e) if e.is_duplicate() => FieldStatus::AlreadyPresent,
        Err(e) if definition.field_type.is_reference() => {
            warn!(
                object = %object,
                field = %definition.api_name,
                error = %e,
                "Lookup creation failed, falling back to LongTextArea"
            );
            match conn.create_field(object, &definition.as_text()).await {
                Ok(_) => FieldStatus::DowngradedToText,
                Err(e) if e.is_duplicate() => FieldStatus::DowngradedToText,
                Err(e) => {
                    error!(object = %object, field = %definition.api_name, error = %e, "Field creation failed");
                    FieldStatus::Failed(e.to_string())
                }
            }
        }
        Err(e) => {
            error!(object = %object, field = %definition.api_name, error = %e, "Field creation failed");
            FieldStatus::Failed(e.to_string())
        }
    };
    FieldOutcome {
        definition: definition.clone(),
        status,
    }
}

/// Relax a field to text after the backend rejected values for it.
pub async fn downgrade_field<C: BackendApi>(conn: &mut C, object: &str, field: &str) -> Result<()> {
    conn.update_field_type(object, field, &FieldType::Text)
        .await
        .map(|_| ())
}

struct FieldJob {
    position: usize,
    object: Arc<str>,
    definition: FieldDefinition,
    reply: mpsc::UnboundedSender<(usize, FieldOutcome)>,
}

#[async_trait]
impl<C: BackendApi> Job<C> for FieldJob {
    async fn execute(self, conn: &mut C) {
        let outcome = ensure_field(conn, &self.object, &self.definition).await;
        let _ = self.reply.send((self.position, outcome));
    }
}
