//! Embedding client abstraction and the OpenAI-compatible HTTP adapter.
//!
//! The pipeline and the QA engine consume embeddings through the
//! [`EmbeddingClient`] trait; the production adapter issues requests directly
//! to an OpenAI-compatible `/embeddings` endpoint.

use crate::config::get_config;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider returned an error response.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be parsed.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build an embedding client from the loaded configuration.
pub fn get_embedding_client() -> Box<dyn EmbeddingClient> {
    let config = get_config();
    Box::new(OpenAiEmbeddingClient::new(
        config.llm_base_url.clone(),
        config.llm_api_key.clone(),
        config.embedding_model.clone(),
        config.embedding_dimension,
    ))
}

/// HTTP adapter for an OpenAI-compatible embeddings API.
pub struct OpenAiEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbeddingClient {
    /// Construct a client for the given endpoint and model.
    pub fn new(base_url: String, api_key: String, model: String, dimension: usize) -> Self {
        let http = Client::builder()
            .user_agent("docuchat/embeddings")
            .build()
            .expect("Failed to construct reqwest::Client for embeddings");
        Self {
            http,
            base_url,
            api_key,
            model,
            dimension,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }
        let expected = texts.len();
        tracing::debug!(model = %self.model, inputs = expected, "Generating embeddings");

        let payload = json!({
            "model": self.model,
            "input": texts,
        });

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach embeddings endpoint at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "embeddings endpoint returned {status}: {body}"
            )));
        }

        let body: EmbeddingsResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode embeddings response: {error}"
            ))
        })?;

        if body.data.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, got {}",
                body.data.len()
            )));
        }

        let embeddings: Vec<Vec<f32>> = body
            .data
            .into_iter()
            .map(|datum| datum.embedding)
            .collect();

        if let Some(vector) = embeddings.iter().find(|vector| vector.len() != self.dimension) {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn client_for(server: &MockServer, dimension: usize) -> OpenAiEmbeddingClient {
        OpenAiEmbeddingClient::new(
            server.base_url(),
            "test-key".into(),
            "text-embedding-3-small".into(),
            dimension,
        )
    }

    #[tokio::test]
    async fn returns_vectors_in_request_order() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer test-key");
                then.status(200).json_body(json!({
                    "data": [
                        { "embedding": [1.0, 0.0] },
                        { "embedding": [0.0, 1.0] }
                    ]
                }));
            })
            .await;

        let client = client_for(&server, 2);
        let embeddings = client
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn surfaces_error_statuses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(429).body("quota exhausted");
            })
            .await;

        let client = client_for(&server, 2);
        let error = client
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("error response");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(message) if message.contains("429")));
    }

    #[tokio::test]
    async fn rejects_dimension_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [ { "embedding": [1.0, 0.0, 0.0] } ]
                }));
            })
            .await;

        let client = client_for(&server, 2);
        let error = client
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("dimension mismatch");
        assert!(matches!(error, EmbeddingClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let server = MockServer::start_async().await;
        let client = client_for(&server, 2);
        let error = client
            .generate_embeddings(Vec::new())
            .await
            .expect_err("empty input");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }
}
