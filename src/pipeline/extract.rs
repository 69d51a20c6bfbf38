//! Recover a JSON array of records from free-form model output.
//!
//! Candidate text is located by an ordered chain of strategies
//! ([`EXTRACTION_ORDER`]); the first one that finds something wins and no
//! other is tried. The candidate is then parsed. Failures never raise: they
//! come back as a single error record carrying the raw text, so a batch
//! caller can treat every result as a list.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

/// Key that marks an error record.
pub const ERROR_KEY: &str = "error";
/// Key holding the raw model output on an error record.
pub const RAW_RESPONSE_KEY: &str = "raw_response";

static TAGGED_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<formal>\s*(.*?)\s*</formal>").unwrap());

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Text between `<formal>` and `</formal>`.
    TaggedBlock,
    /// Body of a fenced code block labelled `json`.
    FencedJson,
    /// The trimmed text, narrowed to the span from the first `[` to the last `]`.
    BracketSpan,
}

/// Strategy precedence. First match wins.
pub const EXTRACTION_ORDER: [ExtractionStrategy; 3] = [
    ExtractionStrategy::TaggedBlock,
    ExtractionStrategy::FencedJson,
    ExtractionStrategy::BracketSpan,
];

impl ExtractionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaggedBlock => "tagged_block",
            Self::FencedJson => "fenced_json",
            Self::BracketSpan => "bracket_span",
        }
    }

    /// Candidate JSON text, or `None` when this strategy does not apply.
    pub fn locate(&self, text: &str) -> Option<String> {
        match self {
            Self::TaggedBlock => capture(&TAGGED_BLOCK, text),
            Self::FencedJson => capture(&FENCED_JSON, text),
            Self::BracketSpan => {
                let trimmed = text.trim();
                let start = trimmed.find('[')?;
                let end = trimmed.rfind(']')?;
                (start < end).then(|| trimmed[start..=end].to_string())
            }
        }
    }
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

/// Run the strategy chain. Falls back to the trimmed text when nothing matches.
pub fn locate_candidate(raw: &str) -> (Option<ExtractionStrategy>, String) {
    for strategy in EXTRACTION_ORDER {
        if let Some(candidate) = strategy.locate(raw) {
            return (Some(strategy), candidate);
        }
    }
    (None, raw.trim().to_string())
}

/// Build the error record that stands in for a failed result.
pub fn error_record(reason: &str, raw_response: Option<&str>) -> Value {
    json!({
        ERROR_KEY: reason,
        RAW_RESPONSE_KEY: raw_response,
    })
}

/// True when `record` is an error record.
pub fn is_error_record(record: &Value) -> bool {
    record.get(ERROR_KEY).is_some()
}

/// Extract the record list from raw model output.
///
/// Always returns a list: the parsed array, or one error record.
pub fn extract_records(raw: &str) -> Vec<Value> {
    let (strategy, candidate) = locate_candidate(raw);
    match strategy {
        Some(s) => tracing::debug!(strategy = s.as_str(), "Located JSON candidate"),
        None => tracing::warn!("Could not reliably find JSON array structure in the response"),
    }

    match serde_json::from_str::<Value>(&candidate) {
        Ok(Value::Array(records)) => {
            tracing::info!(records = records.len(), "Parsed JSON array response");
            records
        }
        Ok(other) => {
            tracing::error!(
                kind = json_kind(&other),
                "Response parsed but is not a JSON array"
            );
            vec![error_record("LLM response is not a JSON array", Some(raw))]
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse JSON response");
            vec![error_record(
                &format!("Failed to parse JSON response: {e}"),
                Some(raw),
            )]
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fenced_block_inside_prose() {
        let raw = "Here is the result:\n```json\n[{\"a\":1}]\n```\nThanks.";
        assert_eq!(extract_records(raw), vec![json!({"a": 1})]);
    }

    #[test]
    fn tagged_block_wins_over_fenced_block() {
        let raw = "```json\n[{\"from\":\"fence\"}]\n```\n<formal>\n[{\"from\":\"tag\"}]\n</formal>";
        assert_eq!(extract_records(raw), vec![json!({"from": "tag"})]);
        assert_eq!(
            locate_candidate(raw).0,
            Some(ExtractionStrategy::TaggedBlock)
        );
    }

    #[test]
    fn bracket_span_strips_surrounding_prose() {
        let raw = "Sure! [{\"q1\":\"yes\"},{\"q1\":\"no\"}] Let me know.";
        let records = extract_records(raw);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["q1"], "no");
    }

    #[test]
    fn bare_array_is_accepted() {
        assert_eq!(extract_records("[]"), Vec::<Value>::new());
    }

    #[test]
    fn invalid_text_becomes_error_record() {
        let records = extract_records("not valid json at all");
        assert_eq!(records.len(), 1);
        assert!(is_error_record(&records[0]));
        assert!(records[0][ERROR_KEY]
            .as_str()
            .unwrap()
            .starts_with("Failed to parse JSON response"));
        assert_eq!(records[0][RAW_RESPONSE_KEY], "not valid json at all");
    }

    #[test]
    fn object_is_not_an_array() {
        let raw = "```json\n{\"a\": 1}\n```";
        let records = extract_records(raw);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0][ERROR_KEY], "LLM response is not a JSON array");
        assert_eq!(records[0][RAW_RESPONSE_KEY], raw);
    }

    #[test]
    fn malformed_tagged_block_does_not_fall_through() {
        // The tag matched, so the valid fenced block is never consulted.
        let raw = "<formal>[{oops}]</formal>\n```json\n[{\"a\":1}]\n```";
        let records = extract_records(raw);
        assert!(is_error_record(&records[0]));
    }

    #[test]
    fn reversed_brackets_fall_back_to_raw_text() {
        let (strategy, candidate) = locate_candidate("  ] nothing [  ");
        assert_eq!(strategy, None);
        assert_eq!(candidate, "] nothing [");
    }

    #[test]
    fn order_is_tag_fence_brackets() {
        assert_eq!(
            EXTRACTION_ORDER,
            [
                ExtractionStrategy::TaggedBlock,
                ExtractionStrategy::FencedJson,
                ExtractionStrategy::BracketSpan
            ]
        );
    }

    #[test]
    fn re_extracting_a_serialized_result_is_stable() {
        let raw = r#"<formal>[{"q1":"yes","q2":["a","b"],"q3":null}]</formal>"#;
        let first = extract_records(raw);
        let again = extract_records(&serde_json::to_string(&first).unwrap());
        assert_eq!(first, again);
    }

    #[test]
    fn error_record_without_raw_text() {
        let record = error_record("API call failed: boom", None);
        assert!(is_error_record(&record));
        assert!(record[RAW_RESPONSE_KEY].is_null());
    }

    #[test]
    fn ordinary_record_is_not_an_error() {
        assert!(!is_error_record(&json!({"dialogue_id": "1"})));
    }
}
