//! Claude through the Anthropic messages API.

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{BackendConfig, BackendError, LlmBackend};
use crate::pipeline::prompt::USER_INSTRUCTION;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeBackend {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: Client,
}

impl ClaudeBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let api_key = config.require_api_key("Anthropic")?;
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
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Serialize)]
struct UserMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<UserMessage<'a>>,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

fn build_request<'a>(
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
) -> MessagesRequest<'a> {
    MessagesRequest {
        model,
        max_tokens,
        temperature,
        system: prompt,
        messages: vec![UserMessage {
            role: "user",
            content: USER_INSTRUCTION,
        }],
    }
}

/// First text block of the reply.
fn response_text(response: MessagesResponse) -> Result<String, BackendError> {
    response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .find_map(|block| block.text)
        .ok_or_else(|| BackendError::MalformedResponse("Empty response from Anthropic".into()))
}

impl LlmBackend for ClaudeBackend {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError> {
        let url = self.endpoint();
        let body = build_request(&self.model, prompt, self.temperature, self.max_tokens);

        tracing::info!(model = %self.model, "Sending request to Claude");
        let response: MessagesResponse = send_json(
            self.client
                .post(&url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body),
            &url,
        )?;
        tracing::info!(model = %self.model, "Received response from Claude");

        response_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &'static str {
        "claude"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::backend::http::test_server;
    use crate::pipeline::backend::BackendKind;

    #[test]
    fn prompt_goes_into_system_field() {
        let request = build_request("claude-3-5-sonnet", "SYSTEM", 0.0, 1024);
        let body = serde_json::to_value(request).unwrap();
        assert_eq!(body["system"], "SYSTEM");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["content"], USER_INSTRUCTION);
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn text_block_is_extracted() {
        let raw = r#"{"content":[{"type":"text","text":"<formal>[]</formal>"}]}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(response).unwrap(), "<formal>[]</formal>");
    }

    #[test]
    fn non_text_blocks_are_skipped() {
        let raw = r#"{"content":[{"type":"thinking"},{"type":"text","text":"ok"}]}"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response_text(response).unwrap(), "ok");
    }

    #[test]
    fn empty_content_is_malformed() {
        let response: MessagesResponse = serde_json::from_str(r#"{"content":[]}"#).unwrap();
        assert!(response_text(response).is_err());
    }

    #[test]
    fn endpoint_uses_messages_path() {
        let cfg =
            BackendConfig::new(BackendKind::Claude, "claude-3-5-sonnet", "p").with_api_key("k");
        let backend = ClaudeBackend::new(&cfg).unwrap();
        assert_eq!(backend.endpoint(), "https://api.anthropic.com/v1/messages");
        assert_eq!(backend.provider(), "claude");
    }

    fn claude_at(base_url: &str) -> ClaudeBackend {
        let cfg = BackendConfig::new(BackendKind::Claude, "claude-3-5-sonnet", "p")
            .with_api_key("sk-ant-test")
            .with_base_url(base_url)
            .with_timeout_secs(5);
        ClaudeBackend::new(&cfg).unwrap()
    }

    #[test]
    fn invoke_posts_messages_with_api_key_headers() {
        let (base_url, server) = test_server::serve_once(
            "200 OK",
            r#"{"content":[{"type":"text","text":"<formal>[]</formal>"}]}"#,
        );

        let text = claude_at(&base_url).invoke("SYSTEM").unwrap();
        let request = server.join().unwrap();

        assert_eq!(text, "<formal>[]</formal>");
        assert_eq!(request.request_line, "POST /v1/messages HTTP/1.1");
        assert_eq!(request.header("x-api-key"), Some("sk-ant-test"));
        assert_eq!(request.header("anthropic-version"), Some(ANTHROPIC_VERSION));
        assert_eq!(request.header("authorization"), None);
        let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(body["system"], "SYSTEM");
    }

    #[test]
    fn invoke_classifies_error_statuses() {
        test_server::assert_error_statuses_classified(|url| Box::new(claude_at(url)));
    }
}
