// ============================================================
// COLUMN PROFILE TYPES
// ============================================================
// Header normalization and per-column sample values

use serde::{Deserialize, Serialize};

/// Maximum length of a field api name on the backend.
pub const MAX_API_NAME_LEN: usize = 63;

/// One raw source row, indexed by the header row.
pub type SourceRow = Vec<String>;

/// Normalize a header into a field api name: trimmed, lower-cased, length-bounded.
pub fn normalize_column_name(header: &str) -> String {
    let lower = header.trim().trim_start_matches('\u{feff}').trim().to_lowercase();
    if lower.chars().count() > MAX_API_NAME_LEN {
        lower.chars().take(MAX_API_NAME_LEN).collect()
    } else {
        lower
    }
}

/// Turn an api name into a human label ("created_date" -> "Created Date").
pub fn label_from_api_name(api_name: &str) -> String {
    api_name
        .split('_')
        .filter(|s| !s.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Header row of a source with its normalized column names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderSet {
    /// Original header cells
    pub raw: Vec<String>,

    /// Normalized name per position; `None` for blank headers
    pub columns: Vec<Option<String>>,

    /// (header, earlier header) pairs that collapse to the same name
    pub duplicates: Vec<(String, String)>,

    /// (original, truncated) pairs for headers longer than the api limit
    pub truncated: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new(raw: Vec<String>) -> Self {
        let mut columns = Vec::with_capacity(raw.len());
        let mut duplicates = Vec::new();
        let mut truncated = Vec::new();
        let mut seen: Vec<(String, String)> = Vec::new();

        for header in &raw {
            let cleaned = header.trim_start_matches('\u{feff}');
            let lower = cleaned.trim().to_lowercase();
            if lower.is_empty() {
                columns.push(None);
                continue;
            }

            let name = normalize_column_name(cleaned);
            if name != lower {
                truncated.push((lower.clone(), name.clone()));
            }

            if let Some((_, earlier)) = seen.iter().find(|(n, _)| *n == name) {
                duplicates.push((header.clone(), earlier.clone()));
            } else {
                seen.push((name.clone(), header.clone()));
            }
            columns.push(Some(name));
        }

        Self {
            raw,
            columns,
            duplicates,
            truncated,
        }
    }

    /// Number of header cells, including blank ones.
    pub fn column_count(&self) -> usize {
        self.raw.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().flatten().any(|c| c == name)
    }

    /// Distinct normalized names, in first-seen order, with their original header.
    pub fn distinct(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = Vec::new();
        for (idx, column) in self.columns.iter().enumerate() {
            if let Some(name) = column {
                if !out.iter().any(|(n, _)| n == name) {
                    out.push((name.as_str(), self.raw[idx].as_str()));
                }
            }
        }
        out
    }

    /// Positions holding a given normalized name.
    pub fn positions_of(&self, name: &str) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.as_deref() == Some(name))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Sampled values for one column. Built once per run and discarded after inference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnProfile {
    /// Normalized column name
    pub name: String,

    /// Original header text, used as the field label
    pub label: String,

    /// Raw sampled values, blanks included
    pub values: Vec<String>,
}

impl ColumnProfile {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            name,
            values,
        }
    }

    /// Transpose sampled rows into one profile per distinct column.
    /// Short rows simply contribute nothing for their missing trailing cells.
    pub fn from_rows(headers: &HeaderSet, rows: &[SourceRow]) -> Vec<ColumnProfile> {
        headers
            .distinct()
            .into_iter()
            .map(|(name, label)| {
                let positions = headers.positions_of(name);
                let values = rows
                    .iter()
                    .filter_map(|row| {
                        positions
                            .iter()
                            .rev()
                            .find_map(|&p| row.get(p).filter(|v| !v.is_empty()))
                            .or_else(|| positions.iter().find_map(|&p| row.get(p)))
                            .cloned()
                    })
                    .collect();
                ColumnProfile {
                    name: name.to_string(),
                    label: label.trim_start_matches('\u{feff}').trim().to_string(),
                    values,
                }
            })
            .collect()
    }
}
