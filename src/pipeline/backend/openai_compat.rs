//! DeepSeek through its OpenAI-compatible chat completions endpoint.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{BackendConfig, BackendError, LlmBackend};
use crate::pipeline::prompt::USER_INSTRUCTION;

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

pub struct DeepSeekBackend {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl DeepSeekBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config.require_api_key("DeepSeek")?;
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
        format!("{}/chat/completions", self.base_url)
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

fn build_request<'a>(
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: prompt,
            },
            ChatMessage {
                role: "user",
                content: USER_INSTRUCTION,
            },
        ],
        temperature,
        max_tokens,
        stream: false,
    }
}

fn response_text(response: ChatResponse) -> Result<String, BackendError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| BackendError::MalformedResponse("DeepSeek returned no choices".into()))
}

impl LlmBackend for DeepSeekBackend {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let url = self.endpoint();
        let body = build_request(&self.model, prompt, self.temperature, self.max_tokens);

        tracing::info!(model = %self.model, "Sending request to DeepSeek");
        let response: ChatResponse = send_json(
            self.client.post(&url).bearer_auth(&self.api_key).json(&body),
            &url,
        )?;
        tracing::info!(model = %self.model, "Received response from DeepSeek");

        response_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "deepseek"
    }
}
