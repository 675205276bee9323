// ============================================================
// SETTINGS
// ============================================================
// Defaults -> TOML file -> SCHEMALOAD_* environment

use crate::domain::error::{AppError, Result};
use crate::domain::import::ImportConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "schemaload.toml";
pub const ENV_PREFIX: &str = "SCHEMALOAD_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub base_url: String,
    pub token: String,
    /// Prefix joined in front of every API path
    pub api_prefix: String,
    pub request_timeout_secs: u64,
    /// Extra attempts after the first for transient failures
    pub max_retries: u32,
    /// First backoff delay; doubled after each retry
    pub retry_backoff_ms: u64,
    /// Start the in-process mock backend and import into it
    pub rehearsal: bool,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            token: String::new(),
            api_prefix: "/api".to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 1000,
            rehearsal: false,
        }
    }
}

impl BackendSettings {
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid backend.base_url '{}': {}", self.base_url, e))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "Unsupported scheme in backend.base_url: {}",
                parsed.scheme()
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(AppError::ConfigError(
                "backend.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Full URL for an API path such as `/metadata/objects`.
    pub fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let prefix = self.api_prefix.trim_matches('/');
        let path = path.trim_start_matches('/');
        if prefix.is_empty() {
            format!("{}/{}", base, path)
        } else {
            format!("{}/{}/{}", base, prefix, path)
        }
    }
}

/// One source to import, with an optional explicit object name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub path: PathBuf,
    #[serde(default)]
    pub object: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub backend: BackendSettings,
    pub import: ImportConfig,
    pub sources: Vec<SourceSpec>,
    /// Directory scanned for `*.csv` files and Parquet dataset directories
    pub data_dir: Option<PathBuf>,
    /// Objects imported first, in this order
    pub priority: Vec<String>,
    /// Where checkpoint files live
    pub state_dir: PathBuf,
    pub stats_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            import: ImportConfig::default(),
            sources: Vec::new(),
            data_dir: None,
            priority: Vec::new(),
            state_dir: PathBuf::from("."),
            stats_file: PathBuf::from("import_stats.csv"),
        }
    }
}

impl Settings {
    /// Load settings. An explicitly named file must exist; the default one may not.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(AppError::ConfigError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                path.to_path_buf()
            }
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };
        Self::from_figment(Self::figment(&path))
    }

    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| AppError::ConfigError(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.backend.validate()?;
        self.import
            .validate_ranges()
            .map_err(|e| AppError::ConfigError(format!("Invalid import settings: {}", e)))
    }
}
