// ============================================================
// REMOTE BACKEND CLIENT
// ============================================================
// Metadata and bulk-insert calls against the object store

mod connection;
mod payloads;

pub use connection::WorkerConnection;
pub use payloads::{BulkInsertRequest, CreateFieldRequest, CreateObjectRequest, UpdateFieldTypeRequest};

use crate::domain::error::Result;
use crate::domain::import::{BulkOutcome, FieldDefinition, FieldType, ObjectDefinition, Record};
use crate::infrastructure::config::BackendSettings;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Calls the import pipeline makes against the backend. Implemented by a
/// worker-owned connection, so every call takes `&mut self`.
#[async_trait]
pub trait BackendApi: Send {
    async fn get_object(&mut self, name: &str) -> Result<Value>;
    async fn create_object(&mut self, def: &ObjectDefinition) -> Result<Value>;
    async fn create_field(&mut self, object: &str, field: &FieldDefinition) -> Result<Value>;
    async fn update_field_type(
        &mut self,
        object: &str,
        field: &str,
        field_type: &FieldType,
    ) -> Result<Value>;
    async fn bulk_insert(&mut self, object: &str, records: &[Record]) -> Result<BulkOutcome>;
}

/// Hands out one connection per worker.
pub trait ConnectionSource: Send + Sync + 'static {
    type Conn: BackendApi + 'static;

    fn connect(&self) -> Self::Conn;
}

/// Connection factory for the real backend.
#[derive(Clone)]
pub struct RemoteClient {
    settings: Arc<BackendSettings>,
}

impl RemoteClient {
    pub fn new(settings: BackendSettings) -> Self {
        Self {
            settings: Arc::new(settings),
        }
    }
}

impl ConnectionSource for RemoteClient {
    type Conn = WorkerConnection;

    fn connect(&self) -> WorkerConnection {
        WorkerConnection::new(self.settings.clone())
    }
}
