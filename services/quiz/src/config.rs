//! Application Configuration Module
//!
//! Loads the quiz service settings from environment variables (and `.env`)
//! into a single struct that `main` wires into the collaborators and host.

use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// The prompts shipped next to this crate's manifest.
pub const DEFAULT_PROMPTS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/prompts");

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAI,
    Simulated,
}

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub provider: Provider,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub tts_model: String,
    pub tts_voice: String,
    pub image_model: String,
    pub prompts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub narration: bool,
    pub call_timeout: Option<Duration>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: String, value: String },
}

fn invalid(name: &str, value: String) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        value,
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `QUIZ_PROVIDER`: "openai" or "simulated". Defaults to "openai".
    // *   `OPENAI_API_KEY`: Required if provider is "openai".
    // *   `CHAT_MODEL`, `TTS_MODEL`, `TTS_VOICE`, `IMAGE_MODEL`: (Optional) OpenAI models and voice.
    // *   `QUIZ_PROMPTS_DIR`: (Optional) Directory of `*.md` prompt overrides. Defaults to the crate's `prompts/`.
    // *   `QUIZ_OUTPUT_DIR`: (Optional) Where narration and images are written. Defaults to "quiz-output".
    // *   `QUIZ_NARRATION`: (Optional) "on" or "off". Defaults to "on".
    // *   `QUIZ_CALL_TIMEOUT_SECS`: (Optional) Upper bound for each service call.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = match var("QUIZ_PROVIDER") {
            None => Provider::OpenAI,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "openai" => Provider::OpenAI,
                "simulated" => Provider::Simulated,
                _ => return Err(invalid("QUIZ_PROVIDER", value)),
            },
        };

        let openai_api_key = var("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());
        if provider == Provider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVar(
                "OPENAI_API_KEY must be set for openai provider".to_string(),
            ));
        }

        // Provide a default for non-critical variables.
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| "gpt-4o".to_string());
        let tts_model = var("TTS_MODEL").unwrap_or_else(|| "gpt-4o-mini-tts".to_string());
        let tts_voice = var("TTS_VOICE").unwrap_or_else(|| "alloy".to_string());
        let image_model = var("IMAGE_MODEL").unwrap_or_else(|| "dall-e-3".to_string());
        let prompts_dir = var("QUIZ_PROMPTS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PROMPTS_DIR));
        let output_dir = var("QUIZ_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("quiz-output"));

        let narration = match var("QUIZ_NARRATION") {
            None => true,
            Some(value) => match value.trim().to_lowercase().as_str() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                _ => return Err(invalid("QUIZ_NARRATION", value)),
            },
        };

        let call_timeout = match var("QUIZ_CALL_TIMEOUT_SECS") {
            None => None,
            Some(value) => match value.trim().parse::<u64>() {
                Ok(0) => None,
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(_) => return Err(invalid("QUIZ_CALL_TIMEOUT_SECS", value)),
            },
        };

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            provider,
            openai_api_key,
            chat_model,
            tts_model,
            tts_voice,
            image_model,
            prompts_dir,
            output_dir,
            narration,
            call_timeout,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_api_key() {
        let config = load(&[("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(config.provider, Provider::OpenAI);
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.tts_voice, "alloy");
        assert_eq!(config.output_dir, PathBuf::from("quiz-output"));
        assert!(config.prompts_dir.ends_with("prompts"));
        assert!(config.narration);
        assert_eq!(config.call_timeout, None);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn test_openai_requires_key() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(_))));
    }

    #[test]
    fn test_simulated_needs_no_key() {
        let config = load(&[
            ("QUIZ_PROVIDER", "Simulated"),
            ("QUIZ_NARRATION", "off"),
            ("QUIZ_CALL_TIMEOUT_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.provider, Provider::Simulated);
        assert!(!config.narration);
        assert_eq!(config.call_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let simulated = ("QUIZ_PROVIDER", "simulated");
        assert!(matches!(
            load(&[("QUIZ_PROVIDER", "gemini")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            load(&[simulated, ("QUIZ_NARRATION", "maybe")]),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            load(&[simulated, ("RUST_LOG", "loud")]),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }
}
