/// Google Gemini provider
///
/// Calls `{api_url}/models/{model}:generateContent` and returns the text of
/// the first candidate. With structured output enabled the service is asked
/// for `application/json`, which removes most code-fence noise but does not
/// make the answer trusted; the validator still checks everything.
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;

use crate::services::{
    prompt::Prompt,
    providers::{GenerationConfig, GenerativeModel, ModelError},
};

pub const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Clone)]
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, api_url: String, model: String) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_url, self.model)
    }

    fn request_body(prompt: &Prompt, config: &GenerationConfig) -> serde_json::Value {
        let mut generation_config = json!({
            "temperature": config.temperature,
            "maxOutputTokens": config.max_output_tokens,
            "candidateCount": 1
        });
        if config.structured_output {
            generation_config["responseMimeType"] = json!("application/json");
        }

        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt.text }]
            }],
            "generationConfig": generation_config
        })
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiProvider {
    async fn generate(
        &self,
        prompt: &Prompt,
        config: &GenerationConfig,
    ) -> Result<String, ModelError> {
        tracing::debug!(
            model = %self.model,
            attempt = prompt.attempt,
            prompt_chars = prompt.text.len(),
            "Calling Gemini"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::request_body(prompt, config))
            .send()
            .await
            .map_err(|e| ModelError::Http(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ModelError::Http(e.without_url().to_string()))?;

        if !status.is_success() {
            tracing::error!(
                status = %status,
                body = %body,
                "Gemini request failed"
            );
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GeminiResponse = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(error = %e, "Failed to deserialize Gemini response");
            ModelError::Http(format!("unreadable Gemini response: {}", e))
        })?;

        let text = parsed.first_text().ok_or(ModelError::EmptyResponse)?;

        tracing::debug!(response_chars = text.len(), "Gemini answered");

        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text parts of the first candidate
    fn first_text(&self) -> Option<String> {
        let candidate = self.candidates.first()?;
        let text: String = candidate
            .content
            .parts
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect();
        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};

    fn prompt() -> Prompt {
        Prompt {
            text: "pick a shirt".to_string(),
            attempt: 1,
        }
    }

    /// Serves a canned Gemini answer on an ephemeral port
    async fn fake_gemini(status: StatusCode, body: serde_json::Value) -> String {
        let app = Router::new().route(
            "/models/:model",
            post(move || {
                let body = body.clone();
                async move { (status, Json(body)) }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_request_body_structured_mode() {
        let config = GenerationConfig {
            temperature: 0.2,
            max_output_tokens: 512,
            structured_output: true,
        };
        let body = GeminiProvider::request_body(&prompt(), &config);

        assert_eq!(body["contents"][0]["parts"][0]["text"], "pick a shirt");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 512);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");

        let config = GenerationConfig {
            structured_output: false,
            ..config
        };
        let body = GeminiProvider::request_body(&prompt(), &config);
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_first_text_joins_parts() {
        let parsed: GeminiResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "{\"explanation\":" }, { "text": " \"x\"}" }] }
            }]
        }))
        .unwrap();
        assert_eq!(parsed.first_text().unwrap(), "{\"explanation\": \"x\"}");

        let empty: GeminiResponse = serde_json::from_value(json!({ "candidates": [] })).unwrap();
        assert!(empty.first_text().is_none());
    }

    #[tokio::test]
    async fn test_generate_returns_candidate_text() {
        let url = fake_gemini(
            StatusCode::OK,
            json!({ "candidates": [{ "content": { "parts": [{ "text": "hello" }] } }] }),
        )
        .await;
        let provider = GeminiProvider::new("key".to_string(), url, DEFAULT_MODEL.to_string());

        let text = provider
            .generate(&prompt(), &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_generate_maps_error_status() {
        let url = fake_gemini(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({ "error": { "message": "overloaded" } }),
        )
        .await;
        let provider = GeminiProvider::new("key".to_string(), url, DEFAULT_MODEL.to_string());

        let err = provider
            .generate(&prompt(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_generate_without_candidates_is_empty_response() {
        let url = fake_gemini(StatusCode::OK, json!({ "candidates": [] })).await;
        let provider = GeminiProvider::new("key".to_string(), url, DEFAULT_MODEL.to_string());

        let err = provider
            .generate(&prompt(), &GenerationConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err, ModelError::EmptyResponse);
    }
}
