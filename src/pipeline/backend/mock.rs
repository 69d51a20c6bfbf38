use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{BackendError, LlmBackend};

/// Scripted backend for tests and dry runs.
///
/// Replays the configured outcomes in order; once the script runs out the
/// last outcome repeats. Every call is counted and its prompt recorded.
pub struct MockBackend {
    model: String,
    script: Vec<Result<String, BackendError>>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new(script: Vec<Result<String, BackendError>>) -> Self {
        Self {
            model: "mock-model".to_string(),
            script,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answer with `response`.
    pub fn replying(response: &str) -> Self {
        Self::new(vec![Ok(response.to_string())])
    }

    /// Always fail with `error`.
    pub fn failing(error: BackendError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl LlmBackend for MockBackend {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let index = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        match self.script.get(index).or_else(|| self.script.last()) {
            Some(outcome) => outcome.clone(),
            None => Err(BackendError::Unavailable("mock backend has no script".into())),
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_configured_response() {
        let backend = MockBackend::replying("test response");
        assert_eq!(backend.invoke("prompt").unwrap(), "test response");
        assert_eq!(backend.call_count(), 1);
    }

    #[test]
    fn script_is_replayed_then_last_repeats() {
        let backend = MockBackend::new(vec![
            Err(BackendError::Transient("reset".into())),
            Ok("second".into()),
        ]);
        assert!(backend.invoke("a").is_err());
        assert_eq!(backend.invoke("b").unwrap(), "second");
        assert_eq!(backend.invoke("c").unwrap(), "second");
        assert_eq!(backend.prompts(), vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_script_is_unavailable() {
        let backend = MockBackend::new(Vec::new());
        assert!(matches!(
            backend.invoke("x"),
            Err(BackendError::Unavailable(_))
        ));
    }
}
