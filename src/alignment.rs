//! Alignment statistics between two submitters' annotations.
//!
//! Records are grouped by `dialogue_id`. Within a group one record is the
//! reference (its `submitter_id` equals the reference submitter) and one the
//! candidate. Groups lacking either role are left out of every statistic.
//! Each configured field of each remaining dialogue is one comparison.

use std::collections::HashMap;

use serde_json::Value;

use crate::models::{
    dialogue_key, submitter_of, values_equal, DialogueComparison, FieldComparison, MatchReport,
    Mismatch, NormalizedRecord, RateMap, DIALOGUE_ID_FIELD,
};

/// Reported in place of a field the record does not carry at all.
pub const ABSENT_PLACEHOLDER: &str = "N/A";

// ═══════════════════════════════════════════════════════════════════════════
// Grouping
// ═══════════════════════════════════════════════════════════════════════════

struct DialogueGroup<'a> {
    key: String,
    reference: Option<&'a NormalizedRecord>,
    candidate: Option<&'a NormalizedRecord>,
}

/// Group records by dialogue, in order of first appearance.
///
/// Later records of the same role replace earlier ones. When both submitter
/// ids are the same, records fill the reference role only.
fn group_by_dialogue<'a>(
    records: &'a [NormalizedRecord],
    reference_submitter_id: &str,
    candidate_submitter_id: &str,
) -> Vec<DialogueGroup<'a>> {
    let mut groups: Vec<DialogueGroup<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let Some(key) = dialogue_key(record.get(DIALOGUE_ID_FIELD)) else {
            continue;
        };
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            groups.push(DialogueGroup {
                key,
                reference: None,
                candidate: None,
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        match submitter_of(record) {
            Some(s) if s == reference_submitter_id => group.reference = Some(record),
            Some(s) if s == candidate_submitter_id => group.candidate = Some(record),
            _ => {}
        }
    }

    groups
}

// ═══════════════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════════════

fn present<'a>(record: &'a NormalizedRecord, field: &str) -> Option<&'a Value> {
    record.get(field).filter(|v| !v.is_null())
}

/// Whether `field` agrees between the two records.
///
/// Null and absent are the same thing: both missing is a match, one missing
/// is a mismatch, otherwise type-aware equality decides.
pub fn alignment_check(
    field: &str,
    reference: &NormalizedRecord,
    candidate: &NormalizedRecord,
) -> bool {
    match (present(reference, field), present(candidate, field)) {
        (None, None) => true,
        (Some(a), Some(b)) => values_equal(a, b),
        _ => false,
    }
}

fn reported_value(record: &NormalizedRecord, field: &str) -> Value {
    record
        .get(field)
        .cloned()
        .unwrap_or_else(|| Value::String(ABSENT_PLACEHOLDER.to_string()))
}

/// Field-by-field comparison of every dialogue that has both roles.
pub fn compare_dialogues<F: AsRef<str>>(
    records: &[NormalizedRecord],
    reference_submitter_id: &str,
    candidate_submitter_id: &str,
    comparison_fields: &[F],
) -> Vec<DialogueComparison> {
    group_by_dialogue(records, reference_submitter_id, candidate_submitter_id)
        .into_iter()
        .filter_map(|group| {
            let (reference, candidate) = (group.reference?, group.candidate?);
            let fields = comparison_fields
                .iter()
                .map(|field| {
                    let field = field.as_ref();
                    FieldComparison {
                        field: field.to_string(),
                        reference_value: reported_value(reference, field),
                        candidate_value: reported_value(candidate, field),
                        is_match: alignment_check(field, reference, candidate),
                    }
                })
                .collect();
            Some(DialogueComparison {
                dialogue_id: group.key,
                fields,
            })
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// Report
// ═══════════════════════════════════════════════════════════════════════════

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Percentage rounded to 2 decimals, 0 when nothing was compared.
fn rate(matches: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        round2(matches as f64 / total as f64 * 100.0)
    }
}

/// Compute match rates and the mismatch ledger.
///
/// Per-dialogue rates divide by the number of fields, per-field rates by the
/// number of compared dialogues, the overall rate by all comparisons.
pub fn compute<F: AsRef<str>>(
    records: &[NormalizedRecord],
    reference_submitter_id: &str,
    candidate_submitter_id: &str,
    comparison_fields: &[F],
) -> MatchReport {
    let dialogues = compare_dialogues(
        records,
        reference_submitter_id,
        candidate_submitter_id,
        comparison_fields,
    );

    let mut field_matches = vec![0usize; comparison_fields.len()];
    let mut per_dialogue = RateMap::new();
    let mut mismatches = Vec::new();
    let mut total_matches = 0usize;
    let mut total_comparisons = 0usize;

    for dialogue in &dialogues {
        let mut matches = 0usize;
        for (i, comparison) in dialogue.fields.iter().enumerate() {
            total_comparisons += 1;
            if comparison.is_match {
                matches += 1;
                field_matches[i] += 1;
            } else {
                mismatches.push(Mismatch {
                    dialogue_id: dialogue.dialogue_id.clone(),
                    field: comparison.field.clone(),
                    reference_value: comparison.reference_value.clone(),
                    candidate_value: comparison.candidate_value.clone(),
                });
            }
        }
        total_matches += matches;
        per_dialogue.insert(
            dialogue.dialogue_id.clone(),
            Value::from(rate(matches, dialogue.fields.len())),
        );
    }

    let per_field: RateMap = comparison_fields
        .iter()
        .zip(field_matches)
        .map(|(field, matches)| {
            (
                field.as_ref().to_string(),
                Value::from(rate(matches, dialogues.len())),
            )
        })
        .collect();

    tracing::debug!(
        dialogues = dialogues.len(),
        comparisons = total_comparisons,
        mismatches = mismatches.len(),
        "Alignment computed"
    );

    MatchReport {
        overall_match_rate: rate(total_matches, total_comparisons),
        per_dialogue_match_rate: per_dialogue,
        per_field_match_rate: per_field,
        mismatches,
    }
}

/// Emit the report through `tracing`, one event per line item.
pub fn log_report(report: &MatchReport) {
    tracing::info!(rate = report.overall_match_rate, "Overall match rate");
    for (dialogue_id, rate) in &report.per_dialogue_match_rate {
        tracing::info!(dialogue_id = %dialogue_id, rate = %rate, "Dialogue match rate");
    }
    for (field, rate) in &report.per_field_match_rate {
        tracing::info!(field = %field, rate = %rate, "Field match rate");
    }
    for m in &report.mismatches {
        tracing::info!(
            dialogue_id = %m.dialogue_id,
            field = %m.field,
            reference = %m.reference_value,
            candidate = %m.candidate_value,
            "Mismatch"
        );
    }
}

/// Emit every compared field at debug level.
pub fn log_comparisons(dialogues: &[DialogueComparison]) {
    for dialogue in dialogues {
        for c in &dialogue.fields {
            tracing::debug!(
                dialogue_id = %dialogue.dialogue_id,
                field = %c.field,
                reference = %c.reference_value,
                candidate = %c.candidate_value,
                is_match = c.is_match,
                "Field comparison"
            );
        }
    }
}
