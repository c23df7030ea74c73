//! Answer generation client abstraction and the chat-completions adapter.
//!
//! The QA engine consumes generation through the [`GenerationClient`] trait.
//! The production adapter issues a single non-streaming chat-completions
//! request per prompt, mirroring the embedding adapter.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationClientError {
    /// Provider could not be reached.
    #[error("Generation provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed generation response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by generative answering backends.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate an answer for the fully rendered prompt.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError>;
}

/// Build a generation client from the loaded configuration.
pub fn get_generation_client() -> Box<dyn GenerationClient> {
    let config = get_config();
    Box::new(OpenAiGenerationClient::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.generation_model.clone(),
    ))
}

/// HTTP adapter for an OpenAI-compatible chat-completions API.
pub struct OpenAiGenerationClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerationClient {
    /// Construct a client for the given endpoint and model.
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        let http = Client::builder()
            .user_agent("docuchat/generation")
            .build()
            .expect("Failed to construct reqwest::Client for generation");
        Self {
            http,
            base_url,
            api_key,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError> {
        tracing::debug!(model = %self.model, prompt_bytes = prompt.len(), "Requesting answer");
        let payload = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            // Deterministic answers keep the query cache honest.
            "temperature": 0,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationClientError::ProviderUnavailable(format!(
                    "failed to reach chat endpoint at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationClientError::GenerationFailed(format!(
                "chat endpoint returned {status}: {body}"
            )));
        }

        let body: ChatCompletionResponse = response.json().await.map_err(|error| {
            GenerationClientError::InvalidResponse(format!(
                "failed to decode chat response: {error}"
            ))
        })?;

        let answer = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerationClientError::InvalidResponse("chat response contained no choices".into())
            })?;

        Ok(answer.trim().to_string())
    }
}
