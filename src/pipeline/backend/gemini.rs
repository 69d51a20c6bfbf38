//! Google Gemini through the `generateContent` REST endpoint.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{BackendConfig, BackendError, LlmBackend};
use crate::pipeline::prompt::USER_INSTRUCTION;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiBackend {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: Client,
}

impl GeminiBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config.require_api_key("Google")?;
        Ok(Self {
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client: build_client(config.timeout_secs)?,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<PartRef<'a>>,
}

#[derive(Serialize)]
struct PartRef<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<PartRef<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

fn build_request(prompt: &str, temperature: f32, max_output_tokens: u32) -> GenerateRequest<'_> {
    GenerateRequest {
        system_instruction: SystemInstruction {
            parts: vec![PartRef { text: prompt }],
        },
        contents: vec![Content {
            role: "user",
            parts: vec![PartRef { text: USER_INSTRUCTION }],
        }],
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens,
        },
    }
}

/// Concatenate the text parts of the first candidate.
fn response_text(response: GenerateResponse) -> Result<String, BackendError> {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| BackendError::MalformedResponse("Gemini returned no candidates".into()))?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    if text.is_empty() {
        return Err(BackendError::MalformedResponse(
            "Gemini candidate has no text parts".into(),
        ));
    }
    Ok(text)
}

impl LlmBackend for GeminiBackend {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let url = self.endpoint();
        let body = build_request(prompt, self.temperature, self.max_output_tokens);

        tracing::info!(model = %self.model, "Sending request to Gemini");
        let response: GenerateResponse = send_json(
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body),
            &url,
        )?;
        tracing::info!(model = %self.model, "Received response from Gemini");

        response_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }
}
