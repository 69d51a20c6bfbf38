use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{BackendConfig, BackendError, LlmBackend};
use crate::pipeline::prompt::USER_INSTRUCTION;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Ollama HTTP client for local LLM inference. No credential needed.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    temperature: f32,
    num_predict: u32,
    client: Client,
}

impl OllamaBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            model: config.model.clone(),
            temperature: config.temperature,
            num_predict: config.max_output_tokens,
            client: build_client(config.timeout_secs)?,
        })
    }
}

/// Request body for Ollama /api/generate
#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

/// Response body from Ollama /api/generate
#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl LlmBackend for OllamaBackend {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model: &self.model,
            prompt: USER_INSTRUCTION,
            system: prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                num_predict: self.num_predict,
            },
        };

        tracing::info!(model = %self.model, "Sending request to Ollama");
        let parsed: OllamaGenerateResponse = send_json(self.client.post(&url).json(&body), &url)?;
        tracing::info!(model = %self.model, "Received response from Ollama");

        Ok(parsed.response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::http::test_server;
    use crate::pipeline::backend::BackendKind;

    #[test]
    fn ollama_client_trims_trailing_slash() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "p")
            .with_base_url("http://localhost:11434/");
        let backend = OllamaBackend::new(&cfg).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
    }

    #[test]
    fn default_local_uses_standard_port() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "p");
        let backend = OllamaBackend::new(&cfg).unwrap();
        assert_eq!(backend.base_url, "http://localhost:11434");
    }

    #[test]
    fn output_budget_maps_to_num_predict() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "p")
            .with_max_output_tokens(512);
        let backend = OllamaBackend::new(&cfg).unwrap();
        assert_eq!(backend.num_predict, 512);
    }

    #[test]
    fn unreachable_server_is_transient() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "p")
            .with_base_url("http://127.0.0.1:9")
            .with_timeout_secs(2);
        let backend = OllamaBackend::new(&cfg).unwrap();
        assert!(backend.invoke("prompt").unwrap_err().is_transient());
    }

    fn ollama_at(base_url: &str) -> OllamaBackend {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "p")
            .with_base_url(base_url)
            .with_timeout_secs(5);
        OllamaBackend::new(&cfg).unwrap()
    }

    #[test]
    fn invoke_posts_generate_without_credentials() {
        let (base_url, server) =
            test_server::serve_once("200 OK", r#"{"model":"llama3","response":"[]","done":true}"#);

        let text = ollama_at(&base_url).invoke("SYSTEM").unwrap();
        let request = server.join().unwrap();

        assert_eq!(text, "[]");
        assert_eq!(request.request_line, "POST /api/generate HTTP/1.1");
        assert_eq!(request.header("authorization"), None);
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["system"], "SYSTEM");
        assert_eq!(body["prompt"], USER_INSTRUCTION);
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn invoke_classifies_error_statuses() {
        test_server::assert_error_statuses_classified(|url| Box::new(ollama_at(url)));
    }
}
