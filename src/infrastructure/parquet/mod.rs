// ============================================================
// PARQUET SOURCES
// ============================================================
// A `.parquet` file, or a directory of them read as one dataset

use crate::domain::error::{AppError, Result};
use crate::domain::import::{FieldType, HeaderSet, SamplingMode, SourceRow};
use crate::infrastructure::csv::{decode_cell, SAMPLE_CHUNKS};
use chrono::{DateTime, NaiveDate};
use parquet::basic::{LogicalType, Type as PhysicalType};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::reader::RowIter;
use parquet::record::{Field, Row};
use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Days between 0001-01-01 and 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One Parquet dataset: every `.parquet` file under a path, in name order.
#[derive(Debug, Clone)]
pub struct ParquetDataset {
    files: Vec<PathBuf>,
    headers: HeaderSet,
    /// Type implied by the column's declared storage, if it settles the question
    declared: Vec<Option<FieldType>>,
    total_rows: usize,
}

impl ParquetDataset {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(AppError::SourceError(format!(
                "File not found: {}",
                path.display()
            )));
        }

        let files = if path.is_dir() {
            let mut files = Vec::new();
            collect_parquet_files(path, &mut files)?;
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };

        let first = files.first().ok_or_else(|| {
            AppError::SourceError(format!("No .parquet files under {}", path.display()))
        })?;

        let reader = open_reader(first)?;
        let schema = reader.metadata().file_metadata().schema_descr_ptr();
        let mut raw = Vec::new();
        let mut declared = Vec::new();
        for field in schema.root_schema().get_fields() {
            raw.push(field.name().to_string());
            declared.push(if field.is_primitive() {
                declared_field_type(
                    field.name(),
                    field.get_physical_type(),
                    field.get_basic_info().logical_type(),
                )
            } else {
                None
            });
        }

        let mut total_rows = 0usize;
        for file in &files {
            let reader = open_reader(file)?;
            total_rows += reader.metadata().file_metadata().num_rows().max(0) as usize;
        }

        debug!(
            path = %path.display(),
            files = files.len(),
            columns = raw.len(),
            rows = total_rows,
            "Opened Parquet dataset"
        );

        Ok(Self {
            files,
            headers: HeaderSet::new(raw),
            declared,
            total_rows,
        })
    }

    pub fn headers(&self) -> &HeaderSet {
        &self.headers
    }

    /// Declared type per header position; `None` means infer from values.
    pub fn declared_types(&self) -> &[Option<FieldType>] {
        &self.declared
    }

    /// Row count from file metadata.
    pub fn total_rows(&self) -> usize {
        self.total_rows
    }

    /// Up to `limit` rows spread over the whole dataset (all rows for `0`).
    /// Row positions come from file metadata, so no byte seeking is needed.
    pub fn sample(&self, limit: usize, mode: SamplingMode) -> Result<Vec<SourceRow>> {
        if limit == 0 || self.total_rows <= limit {
            return self.rows().collect();
        }

        let total = self.total_rows;
        let keep: Box<dyn Fn(usize) -> bool> = match mode {
            SamplingMode::Stratified => {
                let interval = total / limit;
                Box::new(move |index| index % interval == 0)
            }
            SamplingMode::Distributed => {
                let chunks = SAMPLE_CHUNKS as usize;
                let per_chunk = (limit / chunks).max(1);
                Box::new(move |index| {
                    let chunk = index * chunks / total;
                    index - chunk * total / chunks < per_chunk
                })
            }
        };

        let mut sampled = Vec::with_capacity(limit);
        for (index, row) in self.rows().enumerate() {
            if !keep(index) {
                continue;
            }
            sampled.push(row?);
            if sampled.len() >= limit {
                break;
            }
        }
        debug!(rows = sampled.len(), total, mode = ?mode, "Parquet sample");
        Ok(sampled)
    }

    pub fn rows(&self) -> ParquetRows {
        ParquetRows {
            pending: self.files.iter().cloned().collect(),
            current: None,
            columns: self.headers.raw.clone(),
        }
    }
}

/// Streams rows of every file in the dataset as string cells.
pub struct ParquetRows {
    pending: VecDeque<PathBuf>,
    current: Option<RowIter<'static>>,
    columns: Vec<String>,
}

impl Iterator for ParquetRows {
    type Item = Result<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(rows) = self.current.as_mut() {
                match rows.next() {
                    Some(Ok(row)) => return Some(Ok(row_cells(&row, &self.columns))),
                    Some(Err(e)) => {
                        return Some(Err(AppError::ParseError(format!(
                            "Failed to read Parquet row: {}",
                            e
                        ))))
                    }
                    None => self.current = None,
                }
            }

            let path = self.pending.pop_front()?;
            match open_reader(&path) {
                Ok(reader) => {
                    let boxed: Box<dyn FileReader> = Box::new(reader);
                    self.current = Some(RowIter::from_file_into(boxed));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Field type implied by storage alone. Numeric identifiers are left to
/// inference so they can become references.
pub fn declared_field_type(
    name: &str,
    physical: PhysicalType,
    logical: Option<LogicalType>,
) -> Option<FieldType> {
    match logical {
        Some(LogicalType::Date) | Some(LogicalType::Timestamp { .. }) => {
            return Some(FieldType::DateTime)
        }
        Some(LogicalType::String) | Some(LogicalType::Json) | Some(LogicalType::Uuid) => {
            return None
        }
        _ => {}
    }

    let numeric = match physical {
        PhysicalType::BOOLEAN => return Some(FieldType::Boolean),
        PhysicalType::INT96 => return Some(FieldType::DateTime),
        PhysicalType::INT32 | PhysicalType::INT64 | PhysicalType::FLOAT | PhysicalType::DOUBLE => {
            true
        }
        PhysicalType::FIXED_LEN_BYTE_ARRAY => matches!(logical, Some(LogicalType::Decimal { .. })),
        PhysicalType::BYTE_ARRAY => false,
    };

    if numeric && !name.trim().to_lowercase().ends_with("_id") {
        Some(FieldType::Number)
    } else {
        None
    }
}

/// Render one row in header order; absent columns become empty cells.
fn row_cells(row: &Row, columns: &[String]) -> SourceRow {
    let by_name: HashMap<&str, &Field> = row
        .get_column_iter()
        .map(|(name, field)| (name.as_str(), field))
        .collect();
    columns
        .iter()
        .map(|column| by_name.get(column.as_str()).map_or_else(String::new, |f| cell_text(f)))
        .collect()
}

/// String form of a Parquet value as the loader expects it.
pub fn cell_text(field: &Field) -> String {
    match field {
        Field::Null => String::new(),
        Field::Bool(b) => b.to_string(),
        // Display would quote the string.
        Field::Str(s) => s.clone(),
        Field::Bytes(bytes) => decode_cell(bytes.data()),
        Field::Date(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| days.to_string()),
        Field::TimestampMillis(ms) => DateTime::from_timestamp_millis(*ms)
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_else(|| ms.to_string()),
        Field::TimestampMicros(us) => DateTime::from_timestamp_micros(*us)
            .map(|d| d.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
            .unwrap_or_else(|| us.to_string()),
        other => other.to_string(),
    }
}

fn open_reader(path: &Path) -> Result<SerializedFileReader<File>> {
    let file = File::open(path).map_err(|e| {
        AppError::SourceError(format!("Failed to open {}: {}", path.display(), e))
    })?;
    SerializedFileReader::new(file).map_err(|e| {
        AppError::SourceError(format!("Invalid Parquet file {}: {}", path.display(), e))
    })
}

fn collect_parquet_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |n| n.starts_with('.') || n.starts_with('_'));
        if hidden {
            continue;
        }
        if path.is_dir() {
            collect_parquet_files(&path, out)?;
        } else if is_parquet_file(&path) {
            out.push(path);
        }
    }
    Ok(())
}

pub fn is_parquet_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("parquet"))
}
