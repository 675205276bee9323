pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod interfaces;
pub mod shared;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::ImportRunner;
use crate::domain::error::{AppError, Result};
use crate::domain::import::{ImportSummary, RunStatistics};
use crate::infrastructure::config::Settings;
use crate::infrastructure::remote::RemoteClient;
use crate::interfaces::mock_backend::{BackendStore, MockBackend};

/// Import every configured source and return the run summary. The summary
/// is marked partial when `cancel` fired before the run finished.
pub async fn run_import(mut settings: Settings, cancel: CancellationToken) -> Result<ImportSummary> {
    let rehearsal = if settings.backend.rehearsal {
        let backend = MockBackend::start(BackendStore::new(), 0).await?;
        info!(url = %backend.base_url(), "Rehearsal mode, importing into the mock backend");
        settings.backend.base_url = backend.base_url().to_string();
        Some(backend)
    } else {
        None
    };

    let stats = Arc::new(RunStatistics::new());
    let client = Arc::new(RemoteClient::new(settings.backend.clone()));
    let runner = ImportRunner::new(client, settings, stats.clone(), cancel.clone());
    let outcome = runner.run().await;

    if let Some(backend) = rehearsal {
        log_rehearsal(&backend);
        backend.stop().await;
    }
    outcome?;
    Ok(stats.summary(cancel.is_cancelled()))
}

fn log_rehearsal(backend: &MockBackend) {
    let store = backend.store();
    info!(
        objects = store.object_count(),
        bulk_calls = store.bulk_calls(),
        "Rehearsal backend state"
    );
    for (object, fields) in store.snapshot() {
        info!(
            object = %object,
            fields = fields.len(),
            records = store.records(&object).len(),
            "Rehearsed object"
        );
    }
}

fn load_settings(config_path: Option<&Path>) -> Result<Settings> {
    let settings = Settings::load(config_path)?;
    info!(
        backend = %settings.backend.base_url,
        sources = settings.sources.len(),
        data_dir = ?settings.data_dir,
        "Settings loaded"
    );
    Ok(settings)
}

pub fn run() {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = match load_settings(config_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "Failed to load settings");
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to start async runtime");
            std::process::exit(1);
        }
    };

    let result: Result<ImportSummary> = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let signal_token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Shutdown requested, letting in-flight batches finish");
                signal_token.cancel();
            }
        });
        run_import(settings, cancel).await
    });

    match result {
        Ok(summary) => println!("{}", summary),
        Err(AppError::ConfigError(msg)) => {
            error!(error = %msg, "Nothing to import");
            std::process::exit(2);
        }
        Err(e) => {
            error!(error = %e, "Import failed");
            std::process::exit(1);
        }
    }
}
