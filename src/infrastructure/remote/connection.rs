// ============================================================
// WORKER CONNECTION
// ============================================================
// One persistent HTTP connection owned by one worker

use super::payloads::{
    BulkInsertRequest, CreateFieldRequest, CreateObjectRequest, UpdateFieldTypeRequest,
};
use super::BackendApi;
use crate::domain::error::{AppError, Result};
use crate::domain::import::{BulkOutcome, FieldDefinition, FieldType, ObjectDefinition, Record};
use crate::infrastructure::config::BackendSettings;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Created lazily on first request and rebuilt after a transient failure.
/// Never shared between workers.
pub struct WorkerConnection {
    settings: Arc<BackendSettings>,
    client: Option<reqwest::Client>,
    connects: usize,
}

impl WorkerConnection {
    pub fn new(settings: Arc<BackendSettings>) -> Self {
        Self {
            settings,
            client: None,
            connects: 0,
        }
    }

    /// How many times the underlying connection has been (re)opened.
    pub fn connects(&self) -> usize {
        self.connects
    }

    fn client(&mut self) -> Result<reqwest::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(1)
            .timeout(Duration::from_secs(self.settings.request_timeout_secs))
            .build()
            .map_err(|e| AppError::NetworkError(format!("Failed to build client: {}", e)))?;
        self.connects += 1;
        self.client = Some(client.clone());
        Ok(client)
    }

    fn disconnect(&mut self) {
        self.client = None;
    }

    /// Send one request. Transport errors, 5xx and 429 are retried with
    /// exponential backoff on a fresh connection; other 4xx come back at once.
    pub async fn request(&mut self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.settings.endpoint(path);
        let mut backoff = Duration::from_millis(self.settings.retry_backoff_ms);
        let mut attempt = 0u32;

        loop {
            let result = self.send_once(method.clone(), &url, body).await;
            match result {
                Err(err) if err.is_transient() => {
                    self.disconnect();
                    if attempt >= self.settings.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(
                        method = %method,
                        url = %url,
                        attempt,
                        error = %err,
                        "Transient failure, retrying in {:?}",
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                other => return other,
            }
        }
    }

    async fn send_once(&mut self, method: Method, url: &str, body: Option<&Value>) -> Result<Value> {
        let client = self.client()?;
        let mut builder = client.request(method, url);
        if !self.settings.token.is_empty() {
            builder = builder.bearer_auth(&self.settings.token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::NetworkError(format!("Request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(AppError::ApiError {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(url = %url, status = status.as_u16(), "Request ok");
        if text.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        // Non-JSON success bodies come back as a plain string.
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }

    async fn send_json<T: serde::Serialize + Sync>(
        &mut self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<Value> {
        let body = serde_json::to_value(body)
            .map_err(|e| AppError::Internal(format!("Failed to encode request: {}", e)))?;
        self.request(method, path, Some(&body)).await
    }
}

#[async_trait]
impl BackendApi for WorkerConnection {
    async fn get_object(&mut self, name: &str) -> Result<Value> {
        self.request(Method::GET, &format!("/metadata/objects/{}", name), None)
            .await
    }

    async fn create_object(&mut self, def: &ObjectDefinition) -> Result<Value> {
        self.send_json(Method::POST, "/metadata/objects", &CreateObjectRequest::from(def))
            .await
    }

    async fn create_field(&mut self, object: &str, field: &FieldDefinition) -> Result<Value> {
        self.send_json(
            Method::POST,
            &format!("/metadata/objects/{}/fields", object),
            &CreateFieldRequest::from(field),
        )
        .await
    }

    async fn update_field_type(
        &mut self,
        object: &str,
        field: &str,
        field_type: &FieldType,
    ) -> Result<Value> {
        self.send_json(
            Method::PATCH,
            &format!("/metadata/objects/{}/fields/{}", object, field),
            &UpdateFieldTypeRequest::new(field_type),
        )
        .await
    }

    async fn bulk_insert(&mut self, object: &str, records: &[Record]) -> Result<BulkOutcome> {
        let request = BulkInsertRequest {
            records,
            batch_size: records.len(),
        };
        let response = self
            .send_json(Method::POST, &format!("/data/{}/bulk", object), &request)
            .await?;
        Ok(BulkOutcome::from_response(&response))
    }
}
