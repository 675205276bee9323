// In-memory backend for use-case tests. Same store as the mock HTTP
// backend, called directly instead of over a socket.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::error::{AppError, Result};
use crate::domain::import::{BulkOutcome, FieldDefinition, FieldType, ObjectDefinition, Record};
use crate::infrastructure::remote::{
    BackendApi, BulkInsertRequest, ConnectionSource, CreateFieldRequest, CreateObjectRequest,
    UpdateFieldTypeRequest,
};
use crate::interfaces::mock_backend::{BackendStore, SchemaSnapshot};

#[derive(Clone, Default)]
pub struct FakeBackend {
    store: Arc<Mutex<BackendStore>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> MutexGuard<'_, BackendStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn allow_reference_target(&self, name: &str) {
        self.store().allow_reference_target(name);
    }

    pub fn reject_object_creation(&self) {
        self.store().reject_object_creation();
    }

    pub fn snapshot(&self) -> SchemaSnapshot {
        self.store().snapshot()
    }

    pub fn object_count(&self) -> usize {
        self.store().object_count()
    }

    pub fn field_type(&self, object: &str, field: &str) -> Option<FieldType> {
        self.store().field_type(object, field)
    }

    pub fn records(&self, object: &str) -> Vec<Record> {
        self.store().records(object)
    }
}

pub struct FakeConn {
    store: Arc<Mutex<BackendStore>>,
}

impl FakeConn {
    fn store(&self) -> MutexGuard<'_, BackendStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_json<T: serde::Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| AppError::Internal(e.to_string()))
}

#[async_trait]
impl BackendApi for FakeConn {
    async fn get_object(&mut self, name: &str) -> Result<Value> {
        self.store().get_object(name)
    }

    async fn create_object(&mut self, def: &ObjectDefinition) -> Result<Value> {
        let body = to_json(&CreateObjectRequest::from(def))?;
        self.store().create_object(&body)
    }

    async fn create_field(&mut self, object: &str, field: &FieldDefinition) -> Result<Value> {
        let body = to_json(&CreateFieldRequest::from(field))?;
        self.store().create_field(object, &body)
    }

    async fn update_field_type(
        &mut self,
        object: &str,
        field: &str,
        field_type: &FieldType,
    ) -> Result<Value> {
        let body = to_json(&UpdateFieldTypeRequest::new(field_type))?;
        self.store().update_field(object, field, &body)
    }

    async fn bulk_insert(&mut self, object: &str, records: &[Record]) -> Result<BulkOutcome> {
        let body = to_json(&BulkInsertRequest {
            records,
            batch_size: records.len(),
        })?;
        let response = self.store().bulk_insert(object, &body)?;
        Ok(BulkOutcome::from_response(&response))
    }
}

impl ConnectionSource for FakeBackend {
    type Conn = FakeConn;

    fn connect(&self) -> FakeConn {
        FakeConn {
            store: self.store.clone(),
        }
    }
}
