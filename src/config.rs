use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Coachalign";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend selection (`deepseek`, `claude`, `gemini`, `qwen`, `ollama`).
pub const ENV_BACKEND: &str = "COACHALIGN_BACKEND";
/// Path to the prompt template file.
pub const ENV_PROMPT_FILE: &str = "COACHALIGN_PROMPT_FILE";
/// Raw output archive directory override.
pub const ENV_ARCHIVE_DIR: &str = "COACHALIGN_ARCHIVE_DIR";
pub const ENV_TEMPERATURE: &str = "COACHALIGN_TEMPERATURE";
pub const ENV_MAX_OUTPUT_TOKENS: &str = "COACHALIGN_MAX_OUTPUT_TOKENS";

/// Default raw output archive directory, relative to the working directory.
const DEFAULT_ARCHIVE_DIR: &str = "logs";

/// Sampling temperature used when none is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.0;
/// Output budget used when none is configured.
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;
/// Per-request HTTP timeout. Long dialogues can take minutes to annotate.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Total attempts for one backend call, first try included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_BACKOFF: Duration = Duration::from_secs(4);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingVar(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "coachalign=info,coachalign_lib=info,warn"
}

/// Resolve the raw output archive directory.
///
/// `COACHALIGN_ARCHIVE_DIR` wins; otherwise `./logs`.
pub fn archive_dir() -> PathBuf {
    match std::env::var(ENV_ARCHIVE_DIR) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_ARCHIVE_DIR),
    }
}

/// Read an optional, non-empty environment variable.
pub fn env_opt(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read a required, non-empty environment variable.
pub fn env_required(var: &str) -> Result<String, ConfigError> {
    env_opt(var).ok_or_else(|| ConfigError::MissingVar(var.to_string()))
}

/// Parse an optional environment variable, falling back to `default` when unset.
pub fn env_parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env_opt(var) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: var.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_dir_env_override() {
        std::env::set_var(ENV_ARCHIVE_DIR, "/tmp/coachalign-archive-test");
        assert_eq!(archive_dir(), PathBuf::from("/tmp/coachalign-archive-test"));
        std::env::remove_var(ENV_ARCHIVE_DIR);
        assert_eq!(archive_dir(), PathBuf::from("logs"));
    }

    #[test]
    fn env_parse_or_uses_default_when_unset() {
        let value: u32 = env_parse_or("COACHALIGN_TEST_UNSET_VAR", 17).unwrap();
        assert_eq!(value, 17);
    }

    #[test]
    fn env_parse_or_rejects_garbage() {
        std::env::set_var("COACHALIGN_TEST_BAD_NUMBER", "many");
        let result: Result<u32, _> = env_parse_or("COACHALIGN_TEST_BAD_NUMBER", 1);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        std::env::remove_var("COACHALIGN_TEST_BAD_NUMBER");
    }

    #[test]
    fn env_required_reports_variable_name() {
        let err = env_required("COACHALIGN_TEST_MISSING").unwrap_err();
        assert!(err.to_string().contains("COACHALIGN_TEST_MISSING"));
    }

    #[test]
    fn retry_defaults() {
        assert_eq!(DEFAULT_MAX_ATTEMPTS, 3);
        assert_eq!(DEFAULT_BASE_BACKOFF, Duration::from_secs(4));
        assert_eq!(DEFAULT_MAX_BACKOFF, Duration::from_secs(10));
    }

    #[test]
    fn app_name_is_coachalign() {
        assert_eq!(APP_NAME, "Coachalign");
    }
}
