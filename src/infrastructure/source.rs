// ============================================================
// SOURCE FILES
// ============================================================
// One entry point over CSV files and Parquet datasets

use crate::domain::error::Result;
use crate::domain::import::{FieldType, HeaderSet, SamplingMode, SourceRow};
use crate::infrastructure::csv::{CsvParser, CsvSampler};
use crate::infrastructure::parquet::{is_parquet_file, ParquetDataset};
use crate::shared::progress::estimate_total_rows;
use std::path::{Path, PathBuf};

/// Boxed row stream. Built on the thread that consumes it.
pub type RowStream = Box<dyn Iterator<Item = Result<SourceRow>>>;

#[derive(Debug, Clone)]
pub enum DataSource {
    Csv { path: PathBuf, parser: CsvParser },
    Parquet { path: PathBuf, dataset: ParquetDataset },
}

/// Header plus sampled rows, and any types fixed by the source itself.
#[derive(Debug, Clone)]
pub struct SourceSample {
    pub headers: HeaderSet,
    pub rows: Vec<SourceRow>,
    /// Per header position; empty for sources without declared types
    pub declared: Vec<Option<FieldType>>,
}

impl SourceSample {
    pub fn declared_type(&self, name: &str) -> Option<FieldType> {
        self.headers
            .positions_of(name)
            .into_iter()
            .find_map(|p| self.declared.get(p).cloned().flatten())
    }
}

impl DataSource {
    /// Directories and `.parquet` files are Parquet; anything else is CSV.
    pub fn open(path: &Path) -> Result<Self> {
        if path.is_dir() || is_parquet_file(path) {
            let dataset = ParquetDataset::open(path)?;
            return Ok(DataSource::Parquet {
                path: path.to_path_buf(),
                dataset,
            });
        }
        let parser = CsvParser::for_file(path)?;
        Ok(DataSource::Csv {
            path: path.to_path_buf(),
            parser,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            DataSource::Csv { path, .. } | DataSource::Parquet { path, .. } => path,
        }
    }

    pub fn headers(&self) -> Result<HeaderSet> {
        match self {
            DataSource::Csv { path, parser } => parser.read_headers(path),
            DataSource::Parquet { dataset, .. } => Ok(dataset.headers().clone()),
        }
    }

    /// Rows for inference. `limit == 0` means every row.
    pub fn sample(&self, limit: usize, mode: SamplingMode) -> Result<SourceSample> {
        match self {
            DataSource::Csv { path, parser } => {
                let sample = CsvSampler::new(*parser, mode).sample(path, limit)?;
                Ok(SourceSample {
                    headers: sample.headers,
                    rows: sample.rows,
                    declared: Vec::new(),
                })
            }
            DataSource::Parquet { dataset, .. } => Ok(SourceSample {
                headers: dataset.headers().clone(),
                rows: dataset.sample(limit, mode)?,
                declared: dataset.declared_types().to_vec(),
            }),
        }
    }

    /// Stream every data row from the top, header excluded.
    pub fn rows(&self) -> Result<RowStream> {
        match self {
            DataSource::Csv { path, parser } => {
                let (_, rows) = parser.open_rows(path)?;
                Ok(Box::new(rows))
            }
            DataSource::Parquet { dataset, .. } => Ok(Box::new(dataset.rows())),
        }
    }

    /// Approximate data row count for progress reporting.
    pub fn estimate_rows(&self) -> usize {
        match self {
            DataSource::Csv { path, .. } => estimate_total_rows(path),
            DataSource::Parquet { dataset, .. } => dataset.total_rows(),
        }
    }
}
