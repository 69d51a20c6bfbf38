//! Qwen through the DashScope text-generation API.
//!
//! DashScope takes a single prompt string, so the compiled prompt and the
//! user instruction are joined into one turn.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{BackendConfig, BackendError, LlmBackend};
use crate::pipeline::prompt::single_turn_prompt;

const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com";

pub struct QwenBackend {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl QwenBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config.require_api_key("DashScope")?;
        Ok(Self {
            base_url: config.base_url_or(DEFAULT_BASE_URL),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_output_tokens,
            client: build_client(config.timeout_secs)?,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/api/v1/services/aigc/text-generation/generation",
            self.base_url
        )
    }
}

#[derive(Serialize)]
struct GenerationInput {
    prompt: String,
}

#[derive(Serialize)]
struct GenerationParameters {
    temperature: f32,
    max_tokens: u32,
    result_format: &'static str,
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput,
    parameters: GenerationParameters,
}

#[derive(Deserialize)]
struct GenerationResponse {
    output: Option<GenerationOutput>,
}

#[derive(Deserialize)]
struct GenerationOutput {
    text: Option<String>,
    #[serde(default)]
    choices: Vec<OutputChoice>,
}

#[derive(Deserialize)]
struct OutputChoice {
    message: OutputMessage,
}

#[derive(Deserialize)]
struct OutputMessage {
    content: Option<String>,
}

fn build_request<'a>(
    model: &'a str,
    prompt: &str,
    temperature: f32,
    max_tokens: u32,
) -> GenerationRequest<'a> {
    GenerationRequest {
        model,
        input: GenerationInput {
            prompt: single_turn_prompt(prompt),
        },
        parameters: GenerationParameters {
            temperature,
            max_tokens,
            result_format: "text",
        },
    }
}

/// `output.text` in text mode; `output.choices[0].message.content` in message mode.
fn response_text(response: GenerationResponse) -> Result<String, BackendError> {
    let output = response
        .output
        .ok_or_else(|| BackendError::MalformedResponse("DashScope response has no output".into()))?;

    if let Some(text) = output.text {
        return Ok(text);
    }
    output
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| BackendError::MalformedResponse("DashScope output has no text".into()))
}

impl LlmBackend for QwenBackend {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let url = self.endpoint();
        let body = build_request(&self.model, prompt, self.temperature, self.max_tokens);

        tracing::info!(model = %self.model, "Sending request to Qwen");
        let response: GenerationResponse = send_json(
            self.client.post(&url).bearer_auth(&self.api_key).json(&body),
            &url,
        )?;
        tracing::info!(model = %self.model, "Received response from Qwen");

        response_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "qwen"
    }
}
