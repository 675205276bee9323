// ============================================================
// CSV INFRASTRUCTURE LAYER
// ============================================================
// CSV parsing, encoding fallback, and sampling

mod csv_parser;
mod sampler;

pub use csv_parser::{decode_cell, CsvParser, CsvRows};
pub use sampler::{CsvSample, CsvSampler, SAMPLE_CHUNKS, SEEK_THRESHOLD_BYTES};
