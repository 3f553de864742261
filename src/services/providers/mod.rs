/// Generative model providers
///
/// The engine talks to the text-generation service only through the
/// `GenerativeModel` trait, so tests can drive it with stub or mock models
/// and the Gemini client stays a replaceable detail.
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::services::prompt::Prompt;

pub mod gemini;

pub use gemini::GeminiProvider;

/// Generation options sent with every prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Lower is more deterministic
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the service for JSON-only output
    pub structured_output: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            max_output_tokens: 2048,
            structured_output: true,
        }
    }
}

/// Transport-level model failures; all are retried by the controller
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("model service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model response carried no text")]
    EmptyResponse,

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Text-generation service boundary
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Sends the rendered prompt and returns the raw response text
    async fn generate(&self, prompt: &Prompt, config: &GenerationConfig)
        -> Result<String, ModelError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}
