//! Record source boundary: load exported annotation tables, normalize their
//! column names and empty cells, and summarize what was loaded.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    dialogue_key, is_blank, submitter_of, NormalizedRecord, DIALOGUE_ID_FIELD, SUBMITTER_ID_FIELD,
};

/// Submitter label used in summaries for records without one.
pub const EMPTY_SUBMITTER: &str = "(empty)";

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("{path}: expected a JSON array at the top level")]
    NotAnArray { path: PathBuf },

    #[error("{path}: entry {index} is not a JSON object")]
    NotAnObject { path: PathBuf, index: usize },

    #[error("{path}: entry {index} has no '{field}'")]
    MissingField {
        path: PathBuf,
        index: usize,
        field: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════
// Normalization
// ═══════════════════════════════════════════════════════════════════════════

/// Source column → canonical field renames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    renames: Vec<(String, String)>,
}

impl Default for FieldMapping {
    /// Column names of the annotation table export.
    fn default() -> Self {
        Self::new()
            .rename("编号", DIALOGUE_ID_FIELD)
            .rename("提交人", SUBMITTER_ID_FIELD)
    }
}

impl FieldMapping {
    /// No renames at all.
    pub fn new() -> Self {
        Self { renames: Vec::new() }
    }

    pub fn rename(mut self, source: &str, canonical: &str) -> Self {
        self.renames.push((source.to_string(), canonical.to_string()));
        self
    }

    fn canonical<'a>(&'a self, source: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(from, _)| from == source)
            .map_or(source, |(_, to)| to.as_str())
    }
}

/// Rename columns per `mapping` and turn `""` and `[]` into null.
///
/// A canonical field that is already present is never overwritten by a
/// renamed column.
pub fn normalize_record(raw: &Map<String, Value>, mapping: &FieldMapping) -> NormalizedRecord {
    let mut record = NormalizedRecord::new();
    for (name, value) in raw {
        let canonical = mapping.canonical(name);
        if canonical != name && raw.contains_key(canonical) {
            continue;
        }
        let value = if is_blank(value) { Value::Null } else { value.clone() };
        record.insert(canonical.to_string(), value);
    }
    record
}

// ═══════════════════════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════════════════════

/// Read a file holding a JSON array of objects.
pub fn read_object_array(path: &Path) -> Result<Vec<Map<String, Value>>, RecordError> {
    let text = std::fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| RecordError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Array(items) = value else {
        return Err(RecordError::NotAnArray {
            path: path.to_path_buf(),
        });
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(RecordError::NotAnObject {
                path: path.to_path_buf(),
                index,
            }),
        })
        .collect()
}

/// Load and normalize annotation records.
pub fn load_records(
    path: &Path,
    mapping: &FieldMapping,
) -> Result<Vec<NormalizedRecord>, RecordError> {
    let records: Vec<NormalizedRecord> = read_object_array(path)?
        .iter()
        .map(|raw| normalize_record(raw, mapping))
        .collect();
    tracing::info!(path = %path.display(), count = records.len(), "Records loaded");
    Ok(records)
}

/// Load dialogues to analyze as `(dialogue_id, payload)` pairs.
///
/// Each object is one dialogue; the whole object, serialized, is its payload.
pub fn load_dialogues(path: &Path) -> Result<Vec<(String, String)>, RecordError> {
    read_object_array(path)?
        .into_iter()
        .enumerate()
        .map(|(index, dialogue)| {
            let key = dialogue_key(dialogue.get(DIALOGUE_ID_FIELD)).ok_or_else(|| {
                RecordError::MissingField {
                    path: path.to_path_buf(),
                    index,
                    field: DIALOGUE_ID_FIELD.to_string(),
                }
            })?;
            let payload = serde_json::to_string(&dialogue).map_err(|source| RecordError::Json {
                path: path.to_path_buf(),
                source,
            })?;
            Ok((key, payload))
        })
        .collect()
}

/// Read a field list: one name per line, blank lines and `#` comments skipped.
pub fn load_field_list(path: &Path) -> Result<Vec<String>, RecordError> {
    let text = std::fs::read_to_string(path).map_err(|source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

// ═══════════════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════════════

/// Sort key for a dialogue id: its value when all digits, otherwise 0.
fn numeric_order(record: &NormalizedRecord) -> u64 {
    dialogue_key(record.get(DIALOGUE_ID_FIELD))
        .filter(|key| !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|key| key.parse().ok())
        .unwrap_or(0)
}

/// All records of one submitter, ordered by numeric dialogue id.
pub fn records_for_submitter(
    records: &[NormalizedRecord],
    submitter: &str,
) -> Vec<NormalizedRecord> {
    let mut selected: Vec<NormalizedRecord> = records
        .iter()
        .filter(|r| submitter_of(r) == Some(submitter))
        .cloned()
        .collect();
    if selected.is_empty() {
        tracing::warn!(submitter, "No records found for submitter");
    }
    selected.sort_by_key(numeric_order);
    selected
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitterCount {
    pub submitter: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldFill {
    pub field: String,
    pub filled: usize,
    pub total: usize,
    /// Percentage, 2 decimals.
    pub rate: f64,
}

/// Overview of a record collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordSummary {
    pub total: usize,
    /// Every field seen on any record, sorted.
    pub field_names: Vec<String>,
    /// Most records first; ties keep first-seen order.
    pub submitter_counts: Vec<SubmitterCount>,
    /// Sorted by field name.
    pub field_fill: Vec<FieldFill>,
}

pub fn summarize(records: &[NormalizedRecord]) -> RecordSummary {
    let field_names: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();

    let mut submitter_counts: Vec<SubmitterCount> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();
    for record in records {
        let submitter = submitter_of(record).unwrap_or(EMPTY_SUBMITTER);
        match seen.get(submitter) {
            Some(&i) => submitter_counts[i].count += 1,
            None => {
                seen.insert(submitter.to_string(), submitter_counts.len());
                submitter_counts.push(SubmitterCount {
                    submitter: submitter.to_string(),
                    count: 1,
                });
            }
        }
    }
    // Stable sort keeps first-seen order among equal counts.
    submitter_counts.sort_by(|a, b| b.count.cmp(&a.count));

    let total = records.len();
    let field_fill = field_names
        .iter()
        .map(|&field| {
            let filled = records
                .iter()
                .filter(|r| r.get(field).is_some_and(|v| !is_blank(v)))
                .count();
            let rate = if total == 0 {
                0.0
            } else {
                (filled as f64 / total as f64 * 10_000.0).round() / 100.0
            };
            FieldFill {
                field: field.to_string(),
                filled,
                total,
                rate,
            }
        })
        .collect();

    RecordSummary {
        total,
        field_names: field_names.into_iter().map(str::to_string).collect(),
        submitter_counts,
        field_fill,
    }
}

/// Emit a summary through `tracing`.
pub fn log_summary(summary: &RecordSummary) {
    tracing::info!(total = summary.total, fields = summary.field_names.len(), "Record summary");
    for s in &summary.submitter_counts {
        tracing::info!(submitter = %s.submitter, count = s.count, "Records per submitter");
    }
    for f in &summary.field_fill {
        tracing::info!(
            field = %f.field,
            filled = f.filled,
            total = f.total,
            rate = f.rate,
            "Field fill rate"
        );
    }
}
