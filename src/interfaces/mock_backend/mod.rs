// ============================================================
// MOCK BACKEND
// ============================================================
// In-process HTTP server speaking the object store's REST surface

mod store;

pub use store::{BackendStore, SchemaSnapshot};

use actix_web::dev::ServerHandle;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::error::{AppError, Result};

pub type SharedStore = Arc<Mutex<BackendStore>>;

fn lock(store: &SharedStore) -> MutexGuard<'_, BackendStore> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A running mock backend. Routes live under `/api`, matching the default
/// `api_prefix` of the client.
pub struct MockBackend {
    base_url: String,
    store: SharedStore,
    handle: ServerHandle,
}

impl MockBackend {
    /// Bind `127.0.0.1:port` (0 picks a free port) and serve in the background.
    pub async fn start(store: BackendStore, port: u16) -> Result<Self> {
        let store: SharedStore = Arc::new(Mutex::new(store));
        let server_store = store.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(server_store.clone()))
                .service(
                    web::scope("/api")
                        .route("/auth/login", web::post().to(login))
                        .route("/metadata/objects", web::post().to(create_object))
                        .route("/metadata/objects/{name}", web::get().to(get_object))
                        .route("/metadata/objects/{name}/fields", web::post().to(create_field))
                        .route(
                            "/metadata/objects/{name}/fields/{field}",
                            web::patch().to(update_field),
                        )
                        .route("/data/{object}/bulk", web::post().to(bulk_insert)),
                )
                .default_service(web::route().to(not_found))
        })
        .workers(2)
        .disable_signals()
        .bind(("127.0.0.1", port))
        .map_err(|err| AppError::Internal(format!("Failed to bind mock backend: {}", err)))?;

        let addr = server
            .addrs()
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("Mock backend has no bound address".to_string()))?;
        let server = server.run();
        let handle = server.handle();
        tokio::spawn(server);

        let base_url = format!("http://{}", addr);
        info!(url = %base_url, "Mock backend started");
        Ok(Self {
            base_url,
            store,
            handle,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn store(&self) -> MutexGuard<'_, BackendStore> {
        lock(&self.store)
    }

    pub async fn stop(self) {
        let graceful = timeout(Duration::from_secs(2), self.handle.stop(true)).await;
        if graceful.is_err() {
            self.handle.stop(false).await;
            warn!("Mock backend forced stop after timeout");
        } else {
            info!("Mock backend stopped");
        }
    }
}

fn respond(result: Result<Value>, success: StatusCode) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::build(success).json(body),
        Err(AppError::ApiError { status, body }) => {
            HttpResponse::build(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
                .content_type("application/json")
                .body(body)
        }
        Err(other) => HttpResponse::InternalServerError().json(json!({ "error": other.to_string() })),
    }
}

async fn login(body: web::Json<Value>) -> HttpResponse {
    let email = body.get("email").and_then(Value::as_str).unwrap_or_default();
    if email.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "missing 'email'" }));
    }
    debug!(email = %email, "Mock login");
    HttpResponse::Ok().json(json!({ "token": uuid::Uuid::new_v4().to_string() }))
}

async fn get_object(path: web::Path<String>, store: web::Data<SharedStore>) -> HttpResponse {
    respond(lock(&store).get_object(&path), StatusCode::OK)
}

async fn create_object(body: web::Json<Value>, store: web::Data<SharedStore>) -> HttpResponse {
    respond(lock(&store).create_object(&body), StatusCode::CREATED)
}

async fn create_field(
    path: web::Path<String>,
    body: web::Json<Value>,
    store: web::Data<SharedStore>,
) -> HttpResponse {
    respond(lock(&store).create_field(&path, &body), StatusCode::CREATED)
}

async fn update_field(
    path: web::Path<(String, String)>,
    body: web::Json<Value>,
    store: web::Data<SharedStore>,
) -> HttpResponse {
    let (object, field) = path.into_inner();
    respond(lock(&store).update_field(&object, &field, &body), StatusCode::OK)
}

async fn bulk_insert(
    path: web::Path<String>,
    body: web::Json<Value>,
    store: web::Data<SharedStore>,
) -> HttpResponse {
    respond(lock(&store).bulk_insert(&path, &body), StatusCode::OK)
}

async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "error": "No route matched.",
        "method": req.method().as_str(),
        "path": req.path()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::import::{FieldDefinition, FieldType, ObjectDefinition, Record};
    use crate::infrastructure::config::BackendSettings;
    use crate::infrastructure::remote::{BackendApi, WorkerConnection};

    fn settings(base_url: &str) -> Arc<BackendSettings> {
        Arc::new(BackendSettings {
            base_url: base_url.to_string(),
            retry_backoff_ms: 1,
            ..Default::default()
        })
    }

    fn record(name: &str, amount: Value) -> Record {
        let mut record = Record::new();
        record.insert("name".to_string(), json!(name));
        record.insert("amount".to_string(), amount);
        record
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_metadata_round_trip_over_http() {
        let backend = MockBackend::start(BackendStore::new(), 0).await.unwrap();
        let mut conn = WorkerConnection::new(settings(backend.base_url()));

        let missing = conn.get_object("deal").await.unwrap_err();
        assert_eq!(missing.status(), Some(404));
        conn.create_object(&ObjectDefinition::imported("deal")).await.unwrap();
        let again = conn.create_object(&ObjectDefinition::imported("deal")).await.unwrap_err();
        assert!(again.is_duplicate());

        conn.create_field("deal", &FieldDefinition::new("amount", "Amount", FieldType::Number))
            .await
            .unwrap();
        conn.update_field_type("deal", "amount", &FieldType::Text).await.unwrap();
        assert_eq!(backend.store().field_type("deal", "amount"), Some(FieldType::Text));
        // 4xx answers never reopen the connection.
        assert_eq!(conn.connects(), 1);

        backend.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_bulk_insert_retries_through_outage() {
        let mut store = BackendStore::new();
        store.create_object(&json!({"api_name": "deal"})).unwrap();
        store
            .create_field("deal", &json!({"api_name": "amount", "type": "Number"}))
            .unwrap();
        store.fail_next_bulk_calls(2);
        let backend = MockBackend::start(store, 0).await.unwrap();

        let mut conn = WorkerConnection::new(settings(backend.base_url()));
        let records = vec![record("a", json!(1)), record("b", json!("x"))];
        let outcome = conn.bulk_insert("deal", &records).await.unwrap();

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(
            outcome.errors,
            vec!["record 1: validation error on field 'amount': expected number".to_string()]
        );
        assert_eq!(backend.store().bulk_calls(), 3);
        assert_eq!(conn.connects(), 3);
        backend.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exhausted_retries_surface_the_last_error() {
        let mut store = BackendStore::new();
        store.create_object(&json!({"api_name": "deal"})).unwrap();
        store.fail_next_bulk_calls(10);
        let backend = MockBackend::start(store, 0).await.unwrap();

        let mut conn = WorkerConnection::new(settings(backend.base_url()));
        let err = conn.bulk_insert("deal", &[record("a", json!(1))]).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        // One first attempt plus three retries.
        assert_eq!(backend.store().bulk_calls(), 4);
        backend.stop().await;
    }
}
