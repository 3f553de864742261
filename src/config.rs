use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::{
    candidates::DEFAULT_MAX_CANDIDATES,
    providers::{gemini, GenerationConfig},
    recommendations::EngineSettings,
};

/// Application configuration loaded from environment variables
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Tagged product catalog (JSON array)
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Gemini API key
    pub gemini_api_key: String,

    /// Gemini API base URL
    #[serde(default = "default_gemini_api_url")]
    pub gemini_api_url: String,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Prompt/validate rounds per request
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Transport tries per round
    #[serde(default = "default_model_call_attempts")]
    pub model_call_attempts: u32,

    #[serde(default = "default_model_timeout_secs")]
    pub model_timeout_secs: u64,

    #[serde(default = "default_model_backoff_ms")]
    pub model_backoff_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("fashion_products_tagged.json")
}

fn default_gemini_api_url() -> String {
    gemini::DEFAULT_API_URL.to_string()
}

fn default_gemini_model() -> String {
    gemini::DEFAULT_MODEL.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_candidates() -> usize {
    DEFAULT_MAX_CANDIDATES
}

fn default_max_attempts() -> u32 {
    3
}

fn default_model_call_attempts() -> u32 {
    3
}

fn default_model_timeout_secs() -> u64 {
    30
}

fn default_model_backoff_ms() -> u64 {
    500
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_output_tokens() -> u32 {
    2048
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            max_candidates: self.max_candidates,
            max_attempts: self.max_attempts,
            model_call_attempts: self.model_call_attempts,
            model_timeout: Duration::from_secs(self.model_timeout_secs),
            backoff: Duration::from_millis(self.model_backoff_ms),
            generation: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
                ..GenerationConfig::default()
            },
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config: Config = envy::from_iter(vars(&[("GEMINI_API_KEY", "secret")])).unwrap();

        assert_eq!(config.catalog_path, PathBuf::from("fashion_products_tagged.json"));
        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.bind_address(), "127.0.0.1:3000");

        let settings = config.engine_settings();
        assert_eq!(settings.max_candidates, 30);
        assert_eq!(settings.max_attempts, 3);
        assert_eq!(settings.model_timeout, Duration::from_secs(30));
        assert_eq!(settings.backoff, Duration::from_millis(500));
        assert!(settings.generation.structured_output);
    }

    #[test]
    fn test_overrides() {
        let config: Config = envy::from_iter(vars(&[
            ("GEMINI_API_KEY", "secret"),
            ("MAX_ATTEMPTS", "5"),
            ("MAX_CANDIDATES", "12"),
            ("TEMPERATURE", "0.1"),
            ("PORT", "8080"),
        ]))
        .unwrap();

        let settings = config.engine_settings();
        assert_eq!(settings.max_attempts, 5);
        assert_eq!(settings.max_candidates, 12);
        assert_eq!(settings.generation.temperature, 0.1);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn test_api_key_is_required() {
        let result: Result<Config, _> = envy::from_iter(vars(&[]));
        assert!(result.is_err());
    }
}
