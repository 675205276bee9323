// ============================================================
// CSV PARSER
// ============================================================
// Header reading, row streaming and cell decoding for CSV sources

use crate::domain::error::{AppError, Result};
use crate::domain::import::{HeaderSet, SourceRow};
use csv::{ByteRecord, ReaderBuilder, Trim};
use encoding_rs::WINDOWS_1252;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// CSV parser with encoding fallback
#[derive(Debug, Clone, Copy)]
pub struct CsvParser {
    /// Delimiter character (default: comma)
    delimiter: u8,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self {
            delimiter: b',',
        }
    }
}

impl CsvParser {
    /// Create a new CSV parser with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Parser for a file, with the delimiter sniffed from its first 4 KiB.
    pub fn for_file(path: &Path) -> Result<Self> {
        let mut file = open_source(path)?;
        let mut buffer = vec![0u8; 4096];
        let read = file.read(&mut buffer)?;
        buffer.truncate(read);
        let sample = decode_cell(&buffer);
        Ok(Self::default().with_delimiter(Self::detect_delimiter(&sample)))
    }

    /// Reader over any byte source. Headers are handled by the caller.
    pub fn reader<R: Read>(&self, source: R) -> csv::Reader<R> {
        ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .has_headers(false)
            .flexible(true) // Allow rows with different lengths
            .from_reader(source)
    }

    /// Read the header row. Fails for a missing or empty file.
    pub fn read_headers(&self, path: &Path) -> Result<HeaderSet> {
        let mut reader = self.reader(open_source(path)?);
        read_header_record(&mut reader, path)
    }

    /// Open the file and stream its data rows, header skipped.
    pub fn open_rows(&self, path: &Path) -> Result<(HeaderSet, CsvRows)> {
        let mut reader = self.reader(open_source(path)?);
        let headers = read_header_record(&mut reader, path)?;
        Ok((
            headers,
            CsvRows {
                records: reader.into_byte_records(),
                index: 0,
            },
        ))
    }

    /// Detect delimiter from content (comma, semicolon, tab, pipe)
    pub fn detect_delimiter(content: &str) -> u8 {
        let candidates = [b',', b';', b'\t', b'|'];
        let sample_lines: Vec<_> = content.lines().take(10).collect();
        if sample_lines.is_empty() {
            return b',';
        }

        let mut best_delimiter = b',';
        let mut best_score = 0.0f32;

        for &delimiter in &candidates {
            let field_counts: Vec<usize> = sample_lines
                .iter()
                .map(|line| line.bytes().filter(|&b| b == delimiter).count())
                .collect();

            // Score by consistency (low standard deviation) and frequency
            let avg = field_counts.iter().sum::<usize>() as f32 / field_counts.len() as f32;
            let variance = field_counts
                .iter()
                .map(|&x| (x as f32 - avg).powi(2))
                .sum::<f32>()
                / field_counts.len() as f32;

            let score = avg / (1.0 + variance.sqrt());

            if score > best_score {
                best_score = score;
                best_delimiter = delimiter;
            }
        }

        best_delimiter
    }
}

/// Streaming iterator over the data rows of one CSV file.
pub struct CsvRows {
    records: csv::ByteRecordsIntoIter<File>,
    index: usize,
}

impl Iterator for CsvRows {
    type Item = Result<SourceRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.records.next()?;
        self.index += 1;
        Some(next.map(|record| decode_record(&record)).map_err(|e| {
            AppError::ParseError(format!("Failed to parse CSV row {}: {}", self.index, e))
        }))
    }
}

pub(crate) fn open_source(path: &Path) -> Result<File> {
    if !path.exists() {
        return Err(AppError::SourceError(format!(
            "File not found: {}",
            path.display()
        )));
    }
    File::open(path).map_err(|e| {
        AppError::SourceError(format!("Failed to open {}: {}", path.display(), e))
    })
}

pub(crate) fn read_header_record<R: Read>(
    reader: &mut csv::Reader<R>,
    path: &Path,
) -> Result<HeaderSet> {
    let mut record = ByteRecord::new();
    let found = reader.read_byte_record(&mut record).map_err(|e| {
        AppError::ParseError(format!("Failed to read CSV headers: {}", e))
    })?;
    if !found || record.iter().all(|cell| cell.is_empty()) {
        return Err(AppError::SourceError(format!(
            "Empty file: {}",
            path.display()
        )));
    }
    Ok(HeaderSet::new(decode_record(&record)))
}

pub(crate) fn decode_record(record: &ByteRecord) -> SourceRow {
    record.iter().map(decode_cell).collect()
}

/// UTF-8 when valid, Windows-1252 otherwise.
pub fn decode_cell(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(content: &str) -> (HeaderSet, Vec<SourceRow>) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        let (headers, rows) = CsvParser::new().open_rows(file.path()).unwrap();
        (headers, rows.collect::<Result<_>>().unwrap())
    }

    #[test]
    fn test_parse_simple_csv() {
        let (headers, rows) = parse("name,age,city\nAlice,30,NYC\nBob,25,LA");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 3);
        assert_eq!(headers.columns[0].as_deref(), Some("name"));
        assert_eq!(rows[0][0], "Alice");
    }

    #[test]
    fn test_short_rows_are_kept() {
        let (_, rows) = parse("name,amount,notes\nAcme,10\nGlobex");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec!["Globex".to_string()]);
    }

    #[test]
    fn test_detect_delimiter() {
        assert_eq!(CsvParser::detect_delimiter("a,b,c\nd,e,f"), b',');
        assert_eq!(CsvParser::detect_delimiter("a;b;c\nd;e;f"), b';');
        assert_eq!(CsvParser::detect_delimiter(""), b',');
    }

    #[test]
    fn test_bom_is_stripped_from_first_header() {
        let (headers, _) = parse("\u{feff}Name,Email\nAcme,a@b.co");
        assert_eq!(headers.columns[0].as_deref(), Some("name"));
    }

    #[test]
    fn test_windows_1252_fallback() {
        // "Café" with 0xE9 for é
        assert_eq!(decode_cell(&[0x43, 0x61, 0x66, 0xE9]), "Café");
        assert_eq!(decode_cell("plain".as_bytes()), "plain");
    }

    #[test]
    fn test_missing_and_empty_files_are_source_errors() {
        let parser = CsvParser::new();
        let missing = parser.read_headers(Path::new("/definitely/not/here.csv"));
        assert!(matches!(missing, Err(AppError::SourceError(_))));

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        empty.flush().unwrap();
        let result = parser.read_headers(empty.path());
        assert!(matches!(result, Err(AppError::SourceError(_))));
    }

    #[test]
    fn test_open_rows_streams_data_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "id,title").unwrap();
        writeln!(file, "1,first").unwrap();
        writeln!(file, "2,\"second, quoted\"").unwrap();
        file.flush().unwrap();

        let (headers, rows) = CsvParser::new().open_rows(file.path()).unwrap();
        let rows: Vec<SourceRow> = rows.collect::<Result<_>>().unwrap();
        assert_eq!(headers.column_count(), 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][1], "second, quoted");
    }
}
