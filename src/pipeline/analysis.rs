//! Dialogue analysis: compile → call with retry → archive → extract.
//!
//! `analyze` returns a record list for every dialogue it can finish.
//! Permanent backend failures become an error record so a batch keeps going;
//! only exhausted transient retries surface as `Err`, since the whole batch
//! is likely to hit the same network fault.

use serde_json::Value;

use super::archive::RawOutputSink;
use super::backend::{build_backend, BackendConfig, BackendError, LlmBackend};
use super::extract::{error_record, extract_records, is_error_record};
use super::prompt::compile_prompt;
use super::retry::{invoke_with_retry, RetryPolicy};
use crate::models::{DIALOGUE_ID_FIELD, SUBMITTER_ID_FIELD};

pub struct AnalysisPipeline {
    backend: Box<dyn LlmBackend>,
    template: String,
    retry: RetryPolicy,
    archiver: Box<dyn RawOutputSink>,
}

/// Result of [`AnalysisPipeline::analyze_batch`].
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Output records of every processed dialogue, error records included.
    pub records: Vec<Value>,
    /// Dialogues that produced an error record.
    pub failed: Vec<String>,
    /// Dialogues fully processed.
    pub processed: usize,
    /// Set when the batch stopped early on an exhausted transient failure.
    pub aborted: Option<(String, BackendError)>,
}

impl AnalysisPipeline {
    pub fn new(
        backend: Box<dyn LlmBackend>,
        template: &str,
        retry: RetryPolicy,
        archiver: Box<dyn RawOutputSink>,
    ) -> Self {
        Self {
            backend,
            template: template.to_string(),
            retry,
            archiver,
        }
    }

    /// Build the backend from configuration; the system prompt is the template.
    ///
    /// Fails fast on missing model, prompt or credential.
    pub fn from_config(
        config: &BackendConfig,
        retry: RetryPolicy,
        archiver: Box<dyn RawOutputSink>,
    ) -> Result<Self, BackendError> {
        let backend = build_backend(config)?;
        Ok(Self::new(backend, &config.system_prompt, retry, archiver))
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Analyze one dialogue payload.
    pub fn analyze(&self, payload: &str) -> Result<Vec<Value>, BackendError> {
        let prompt = compile_prompt(&self.template, payload);

        let raw = match invoke_with_retry(self.backend.as_ref(), &prompt, &self.retry) {
            Ok(raw) => raw,
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => {
                tracing::error!(
                    provider = self.backend.provider(),
                    model = %self.backend.model_name(),
                    error = %e,
                    "Backend call failed, recording error"
                );
                return Ok(vec![error_record(&format!("API call failed: {e}"), None)]);
            }
        };

        self.archiver.archive(self.backend.model_name(), &raw);
        Ok(extract_records(&raw))
    }

    /// Analyze dialogues in the given order.
    ///
    /// Records missing a `dialogue_id` get the dialogue key; records missing a
    /// `submitter_id` get the model name, so the output can be aligned
    /// directly against reference annotations.
    pub fn analyze_batch<'a, I>(&self, dialogues: I) -> BatchOutcome
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut outcome = BatchOutcome::default();

        for (dialogue_id, payload) in dialogues {
            tracing::info!(dialogue_id, "Analyzing dialogue");
            let records = match self.analyze(payload) {
                Ok(records) => records,
                Err(e) => {
                    tracing::error!(
                        dialogue_id,
                        error = %e,
                        "Transient failures exhausted retries, stopping batch"
                    );
                    outcome.aborted = Some((dialogue_id.to_string(), e));
                    break;
                }
            };

            if records.iter().any(is_error_record) {
                outcome.failed.push(dialogue_id.to_string());
            }
            outcome
                .records
                .extend(records.into_iter().map(|r| self.stamp(r, dialogue_id)));
            outcome.processed += 1;
        }

        tracing::info!(
            processed = outcome.processed,
            failed = outcome.failed.len(),
            aborted = outcome.aborted.is_some(),
            "Batch analysis finished"
        );
        outcome
    }

    fn stamp(&self, mut record: Value, dialogue_id: &str) -> Value {
        if let Value::Object(map) = &mut record {
            if map.get(DIALOGUE_ID_FIELD).map_or(true, Value::is_null) {
                map.insert(DIALOGUE_ID_FIELD.into(), Value::String(dialogue_id.into()));
            }
            if map.get(SUBMITTER_ID_FIELD).map_or(true, Value::is_null) {
                map.insert(
                    SUBMITTER_ID_FIELD.into(),
                    Value::String(self.backend.model_name().into()),
                );
            }
        }
        record
    }
}
