use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Insertion-ordered map of rates keyed by dialogue id or field name.
pub type RateMap = serde_json::Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub overall_match_rate: f64,
    #[serde(rename = "per_dialogue")]
    pub per_dialogue_match_rate: RateMap,
    #[serde(rename = "per_field")]
    pub per_field_match_rate: RateMap,
    pub mismatches: Vec<Mismatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mismatch {
    pub dialogue_id: String,
    pub field: String,
    pub reference_value: Value,
    pub candidate_value: Value,
}

/// One field of one compared dialogue, matched or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldComparison {
    pub field: String,
    pub reference_value: Value,
    pub candidate_value: Value,
    pub is_match: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueComparison {
    pub dialogue_id: String,
    pub fields: Vec<FieldComparison>,
}

impl MatchReport {
    pub fn dialogue_rate(&self, dialogue_id: &str) -> Option<f64> {
        self.per_dialogue_match_rate.get(dialogue_id).and_then(Value::as_f64)
    }

    pub fn field_rate(&self, field: &str) -> Option<f64> {
        self.per_field_match_rate.get(field).and_then(Value::as_f64)
    }
}
