use crate::domain::error::{AppError, Result};
use chrono::Local;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Row-offset watermark for one object, stored as a single decimal integer.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn for_object(state_dir: &Path, object: &str) -> Self {
        Self::new(state_dir.join(format!(".{}.checkpoint", object)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable checkpoints count as zero.
    pub fn load(&self) -> usize {
        match fs::read_to_string(&self.path) {
            Ok(text) => text.trim().parse().unwrap_or_else(|_| {
                warn!(path = %self.path.display(), "Ignoring malformed checkpoint");
                0
            }),
            Err(_) => 0,
        }
    }

    /// Persist `offset` unless a larger value is already stored.
    pub fn advance(&self, offset: usize) -> Result<usize> {
        let current = self.load();
        if offset <= current {
            return Ok(current);
        }
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let tmp = self.path.with_extension("checkpoint.tmp");
        fs::write(&tmp, offset.to_string())?;
        fs::rename(&tmp, &self.path)?;
        Ok(offset)
    }

    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatsLine<'a> {
    #[serde(rename = "Object")]
    object: &'a str,
    #[serde(rename = "Total")]
    total: usize,
    #[serde(rename = "Success")]
    success: usize,
    #[serde(rename = "Failures")]
    failures: usize,
    #[serde(rename = "Date")]
    date: String,
}

/// Append-only CSV log with one line per finished object import.
#[derive(Debug, Clone)]
pub struct StatsLog {
    path: PathBuf,
}

impl StatsLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn append(&self, object: &str, total: usize, success: usize, failures: usize) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_dir(parent)?;
        }
        let write_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer
            .serialize(StatsLine {
                object,
                total,
                success,
                failures,
                date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .map_err(|e| AppError::IoError(format!("Failed to write stats: {}", e)))?;
        writer.flush()?;
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}
