// ============================================================
// CSV SAMPLER
// ============================================================
// Bounded, representative row samples without loading the whole file

use super::csv_parser::{decode_record, open_source, read_header_record, CsvParser};
use crate::domain::error::{AppError, Result};
use crate::domain::import::{HeaderSet, SamplingMode, SourceRow};
use csv::{ByteRecord, Position};
use std::io::SeekFrom;
use std::path::Path;
use tracing::debug;

/// Number of evenly spaced byte regions visited by distributed sampling.
pub const SAMPLE_CHUNKS: u64 = 20;

/// Below this size, distributed sampling reads linearly instead of seeking.
pub const SEEK_THRESHOLD_BYTES: u64 = 50_000;

/// Rows sampled from one CSV source
#[derive(Debug, Clone)]
pub struct CsvSample {
    pub headers: HeaderSet,
    pub rows: Vec<SourceRow>,
}

pub struct CsvSampler {
    parser: CsvParser,
    mode: SamplingMode,
}

impl CsvSampler {
    pub fn new(parser: CsvParser, mode: SamplingMode) -> Self {
        Self { parser, mode }
    }

    /// Sample up to `limit` rows. `0` reads every row.
    pub fn sample(&self, path: &Path, limit: usize) -> Result<CsvSample> {
        if limit == 0 {
            return self.full_scan(path);
        }
        match self.mode {
            SamplingMode::Distributed => self.distributed(path, limit),
            SamplingMode::Stratified => self.stratified(path, limit),
        }
    }

    fn full_scan(&self, path: &Path) -> Result<CsvSample> {
        let (headers, rows) = self.parser.open_rows(path)?;
        let rows = rows.collect::<Result<Vec<_>>>()?;
        debug!(path = %path.display(), rows = rows.len(), "Full scan sample");
        Ok(CsvSample { headers, rows })
    }

    /// Seek to `SAMPLE_CHUNKS` proportional offsets, discard the partial line
    /// at each landing point, then read `limit / SAMPLE_CHUNKS` whole rows.
    fn distributed(&self, path: &Path, limit: usize) -> Result<CsvSample> {
        let file = open_source(path)?;
        let total_bytes = file.metadata()?.len();
        let mut reader = self.parser.reader(file);
        let headers = read_header_record(&mut reader, path)?;

        let per_chunk = (limit / SAMPLE_CHUNKS as usize).max(1);
        let seekable = total_bytes > SEEK_THRESHOLD_BYTES;
        let mut rows = Vec::with_capacity(limit);
        let mut record = ByteRecord::new();

        'chunks: for chunk in 0..SAMPLE_CHUNKS {
            if chunk > 0 && seekable {
                let offset = total_bytes * chunk / SAMPLE_CHUNKS;
                // Never seek backwards over rows already sampled.
                if offset > reader.position().byte() {
                    let mut position = Position::new();
                    position.set_byte(offset);
                    reader
                        .seek_raw(SeekFrom::Start(offset), position)
                        .map_err(|e| AppError::IoError(format!("Seek failed: {}", e)))?;
                    // Landing point is usually mid-row.
                    if !read_record(&mut reader, &mut record)? {
                        break;
                    }
                }
            }

            for _ in 0..per_chunk {
                if !read_record(&mut reader, &mut record)? {
                    if !seekable || chunk + 1 == SAMPLE_CHUNKS {
                        break 'chunks;
                    }
                    continue 'chunks;
                }
                rows.push(decode_record(&record));
                if rows.len() >= limit {
                    break 'chunks;
                }
            }
        }

        debug!(
            path = %path.display(),
            rows = rows.len(),
            seekable,
            "Distributed sample"
        );
        Ok(CsvSample { headers, rows })
    }

    /// Count the rows, then keep every `rows / limit`-th one.
    fn stratified(&self, path: &Path, limit: usize) -> Result<CsvSample> {
        let (headers, counting) = self.parser.open_rows(path)?;
        let total = counting.count();
        let interval = if total <= limit { 1 } else { total / limit };

        let (_, rows) = self.parser.open_rows(path)?;
        let mut sampled = Vec::with_capacity(limit.min(total));
        for (index, row) in rows.enumerate() {
            if index % interval != 0 {
                continue;
            }
            sampled.push(row?);
            if sampled.len() >= limit {
                break;
            }
        }

        debug!(
            path = %path.display(),
            rows = sampled.len(),
            interval,
            "Stratified sample"
        );
        Ok(CsvSample {
            headers,
            rows: sampled,
        })
    }
}

fn read_record<R: std::io::Read>(reader: &mut csv::Reader<R>, record: &mut ByteRecord) -> Result<bool> {
    reader
        .read_byte_record(record)
        .map_err(|e| AppError::ParseError(format!("Failed to read CSV row: {}", e)))
}
