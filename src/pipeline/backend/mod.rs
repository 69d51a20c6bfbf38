//! Model backends: one blocking HTTP adapter per vendor behind a shared trait.
//!
//! Every adapter turns a compiled prompt into raw response text and reports
//! failures in three classes:
//! - `Unavailable`: configuration or credentials missing, raised at construction
//! - `Transient`: network-class faults worth retrying unchanged
//! - `Permanent` / `MalformedResponse`: retrying cannot help
//!
//! The variant is chosen once from [`BackendConfig`] by [`build_backend`].

pub mod anthropic;
pub mod dashscope;
pub mod gemini;
pub mod http;
pub mod mock;
pub mod ollama;
pub mod openai_compat;

pub use anthropic::ClaudeBackend;
pub use dashscope::QwenBackend;
pub use gemini::GeminiBackend;
pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compat::DeepSeekBackend;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::config::{
    self, ConfigError, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_TEMPERATURE, DEFAULT_TIMEOUT_SECS,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Transient transport error: {0}")]
    Transient(String),

    #[error("Backend returned error (status {status:?}): {body}")]
    Permanent { status: Option<u16>, body: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Only network-class faults are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }
}

impl From<ConfigError> for BackendError {
    fn from(e: ConfigError) -> Self {
        BackendError::Unavailable(e.to_string())
    }
}

/// A model backend that turns a compiled prompt into raw response text.
pub trait LlmBackend: Send + Sync {
    fn invoke(&self, prompt: &str) -> Result<String, BackendError>;

    /// Model identifier, used to key archived responses.
    fn model_name(&self) -> &str;

    /// Short vendor label for logs.
    fn provider(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    DeepSeek,
    Claude,
    Gemini,
    Qwen,
    Ollama,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Qwen => "qwen",
            Self::Ollama => "ollama",
        }
    }

    /// Read the backend kind from `COACHALIGN_BACKEND`, defaulting to DeepSeek.
    pub fn from_env() -> Result<Self, BackendError> {
        match config::env_opt(config::ENV_BACKEND) {
            None => Ok(Self::DeepSeek),
            Some(value) => value.parse(),
        }
    }

    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Claude => Some("CLAUDE_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Qwen => Some("DASHSCOPE_API_KEY"),
            Self::Ollama => None,
        }
    }

    fn model_var(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_MODEL",
            Self::Claude => "CLAUDE_MODEL",
            Self::Gemini => "GEMINI_MODEL",
            Self::Qwen => "QWEN_MODEL",
            Self::Ollama => "OLLAMA_MODEL",
        }
    }

    fn base_url_var(&self) -> &'static str {
        match self {
            Self::DeepSeek => "DEEPSEEK_BASE_URL",
            Self::Claude => "CLAUDE_BASE_URL",
            Self::Gemini => "GEMINI_BASE_URL",
            Self::Qwen => "DASHSCOPE_BASE_URL",
            Self::Ollama => "OLLAMA_BASE_URL",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "claude" | "anthropic" => Ok(Self::Claude),
            "gemini" | "google" => Ok(Self::Gemini),
            "qwen" | "dashscope" | "tongyi" => Ok(Self::Qwen),
            "ollama" | "local" => Ok(Self::Ollama),
            other => Err(BackendError::Unavailable(format!(
                "unknown backend '{other}' (valid: deepseek, claude, gemini, qwen, ollama)"
            ))),
        }
    }
}

/// Everything an adapter needs to talk to its vendor.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub api_key: Option<String>,
    pub model: String,
    /// Prompt template; compiled per dialogue and sent as the system instruction.
    pub system_prompt: String,
    /// Endpoint override; each vendor has its own default.
    pub base_url: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, model: &str, system_prompt: &str) -> Self {
        Self {
            kind,
            api_key: None,
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            base_url: None,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Load credentials, model and endpoint for `kind` from the environment.
    ///
    /// A missing credential is not an error here; [`build_backend`] rejects it.
    pub fn from_env(kind: BackendKind, system_prompt: &str) -> Result<Self, BackendError> {
        let model = config::env_required(kind.model_var())?;
        let mut cfg = Self::new(kind, &model, system_prompt);
        cfg.api_key = kind.api_key_var().and_then(config::env_opt);
        cfg.base_url = config::env_opt(kind.base_url_var());
        cfg.temperature = config::env_parse_or(config::ENV_TEMPERATURE, DEFAULT_TEMPERATURE)?;
        cfg.max_output_tokens =
            config::env_parse_or(config::ENV_MAX_OUTPUT_TOKENS, DEFAULT_MAX_OUTPUT_TOKENS)?;
        Ok(cfg)
    }

    /// Fail fast on configuration that can never produce a useful call.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.model.trim().is_empty() {
            return Err(BackendError::Unavailable("model name is required".into()));
        }
        if self.system_prompt.trim().is_empty() {
            return Err(BackendError::Unavailable("system prompt is required".into()));
        }
        Ok(())
    }

    /// The credential, or `Unavailable` naming the vendor.
    pub(crate) fn require_api_key(&self, vendor: &str) -> Result<String, BackendError> {
        match self.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key.to_string()),
            _ => Err(BackendError::Unavailable(format!("{vendor} API key is required"))),
        }
    }

    /// Endpoint override without a trailing slash, or the vendor default.
    pub(crate) fn base_url_or(&self, default: &str) -> String {
        self.base_url
            .as_deref()
            .unwrap_or(default)
            .trim_end_matches('/')
            .to_string()
    }
}

/// Construct the adapter selected by `config.kind`.
pub fn build_backend(config: &BackendConfig) -> Result<Box<dyn LlmBackend>, BackendError> {
    config.validate()?;
    let backend: Box<dyn LlmBackend> = match config.kind {
        BackendKind::DeepSeek => Box::new(DeepSeekBackend::new(config)?),
        BackendKind::Claude => Box::new(ClaudeBackend::new(config)?),
        BackendKind::Gemini => Box::new(GeminiBackend::new(config)?),
        BackendKind::Qwen => Box::new(QwenBackend::new(config)?),
        BackendKind::Ollama => Box::new(OllamaBackend::new(config)?),
    };
    tracing::info!(
        provider = backend.provider(),
        model = %backend.model_name(),
        "Backend client initialized"
    );
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_aliases() {
        assert_eq!("deepseek".parse::<BackendKind>().unwrap(), BackendKind::DeepSeek);
        assert_eq!("Anthropic".parse::<BackendKind>().unwrap(), BackendKind::Claude);
        assert_eq!("google".parse::<BackendKind>().unwrap(), BackendKind::Gemini);
        assert_eq!("tongyi".parse::<BackendKind>().unwrap(), BackendKind::Qwen);
        assert_eq!(" LOCAL ".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert!(matches!(
            "gpt-5".parse::<BackendKind>(),
            Err(BackendError::Unavailable(_))
        ));
    }

    #[test]
    fn kind_display_round_trips() {
        for kind in [
            BackendKind::DeepSeek,
            BackendKind::Claude,
            BackendKind::Gemini,
            BackendKind::Qwen,
            BackendKind::Ollama,
        ] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
    }

    #[test]
    fn config_defaults() {
        let cfg = BackendConfig::new(BackendKind::Claude, "claude-3", "prompt");
        assert_eq!(cfg.temperature, 0.0);
        assert_eq!(cfg.max_output_tokens, 8192);
        assert!(cfg.api_key.is_none());
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn empty_model_is_unavailable() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "  ", "prompt");
        let err = build_backend(&cfg).err().unwrap();
        assert_eq!(err, BackendError::Unavailable("model name is required".into()));
    }

    #[test]
    fn empty_system_prompt_is_unavailable() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "");
        let err = build_backend(&cfg).err().unwrap();
        assert_eq!(err, BackendError::Unavailable("system prompt is required".into()));
    }

    #[test]
    fn missing_credential_is_unavailable_for_hosted_backends() {
        for kind in [
            BackendKind::DeepSeek,
            BackendKind::Claude,
            BackendKind::Gemini,
            BackendKind::Qwen,
        ] {
            let cfg = BackendConfig::new(kind, "model", "prompt");
            let err = build_backend(&cfg).err().unwrap();
            assert!(
                matches!(err, BackendError::Unavailable(ref msg) if msg.contains("API key")),
                "{kind}: {err}"
            );
        }
    }

    #[test]
    fn blank_credential_counts_as_missing() {
        let cfg = BackendConfig::new(BackendKind::Claude, "model", "prompt")
            .with_api_key("  ");
        assert!(build_backend(&cfg).is_err());
    }

    #[test]
    fn ollama_needs_no_credential() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3", "prompt");
        let backend = build_backend(&cfg).unwrap();
        assert_eq!(backend.model_name(), "llama3");
        assert_eq!(backend.provider(), "ollama");
    }

    #[test]
    fn build_selects_variant_by_kind() {
        let cfg = BackendConfig::new(BackendKind::Gemini, "gemini-1.5-pro", "prompt")
            .with_api_key("k");
        assert_eq!(build_backend(&cfg).unwrap().provider(), "gemini");
    }

    #[test]
    fn base_url_override_trims_trailing_slash() {
        let cfg = BackendConfig::new(BackendKind::DeepSeek, "m", "p")
            .with_base_url("https://proxy.example.com/v1/");
        assert_eq!(cfg.base_url_or("https://default"), "https://proxy.example.com/v1");
        let cfg = BackendConfig::new(BackendKind::DeepSeek, "m", "p");
        assert_eq!(cfg.base_url_or("https://default/"), "https://default");
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(BackendError::Transient("reset".into()).is_transient());
        assert!(!BackendError::Unavailable("key".into()).is_transient());
        assert!(!BackendError::MalformedResponse("x".into()).is_transient());
        let rejected = BackendError::Permanent {
            status: Some(401),
            body: String::new(),
        };
        assert!(!rejected.is_transient());
    }

    #[test]
    fn from_env_reads_vendor_variables() {
        std::env::set_var("QWEN_MODEL", "qwen-max");
        std::env::set_var("DASHSCOPE_API_KEY", "sk-test");
        std::env::set_var("DASHSCOPE_BASE_URL", "https://dashscope.example.com");
        let cfg = BackendConfig::from_env(BackendKind::Qwen, "template").unwrap();
        assert_eq!(cfg.model, "qwen-max");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.base_url.as_deref(), Some("https://dashscope.example.com"));
        std::env::remove_var("QWEN_MODEL");
        std::env::remove_var("DASHSCOPE_API_KEY");
        std::env::remove_var("DASHSCOPE_BASE_URL");
    }

    #[test]
    fn from_env_requires_model() {
        std::env::remove_var("GEMINI_MODEL");
        let err = BackendConfig::from_env(BackendKind::Gemini, "template").unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(ref msg) if msg.contains("GEMINI_MODEL")));
    }
}
