//! Retrieval-augmented question answering.
//!
//! The engine consults the query cache first, then retrieves the most
//! relevant chunks from the session's index and asks the generation
//! capability once. A missing index is a distinct "not ready" condition, not
//! a generic failure, so the HTTP layer can answer with a retry-later signal.

use crate::{
    cache::QueryCache,
    embedding::{EmbeddingClient, EmbeddingClientError},
    generation::{GenerationClient, GenerationClientError},
    index::{IndexError, VectorIndexStore},
    metrics::ServerMetrics,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the question-answering path.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The referenced session does not exist.
    #[error("session not found")]
    NotFound,
    /// The session's index is not available yet.
    #[error("document is still being processed")]
    NotReady,
    /// A downstream capability failed during the live query.
    #[error("answer generation failed: {0}")]
    Service(String),
}

impl From<EmbeddingClientError> for ChatError {
    fn from(error: EmbeddingClientError) -> Self {
        Self::Service(error.to_string())
    }
}

impl From<GenerationClientError> for ChatError {
    fn from(error: GenerationClientError) -> Self {
        Self::Service(error.to_string())
    }
}

impl From<IndexError> for ChatError {
    fn from(error: IndexError) -> Self {
        match error {
            IndexError::NotFound => Self::NotReady,
            other => Self::Service(other.to_string()),
        }
    }
}

/// Orchestrates retrieval and generation for a single question.
pub struct QaEngine {
    embedding_client: Arc<dyn EmbeddingClient>,
    generation_client: Arc<dyn GenerationClient>,
    store: Arc<VectorIndexStore>,
    cache: QueryCache,
    metrics: Arc<ServerMetrics>,
    top_k: usize,
}

impl QaEngine {
    /// Assemble an engine from its collaborators.
    pub fn new(
        embedding_client: Arc<dyn EmbeddingClient>,
        generation_client: Arc<dyn GenerationClient>,
        store: Arc<VectorIndexStore>,
        cache: QueryCache,
        metrics: Arc<ServerMetrics>,
        top_k: usize,
    ) -> Self {
        Self {
            embedding_client,
            generation_client,
            store,
            cache,
            metrics,
            top_k,
        }
    }

    /// Answer a question against the session's ingested document.
    pub async fn answer(&self, session_id: &str, question: &str) -> Result<String, ChatError> {
        if let Some(cached) = self.cache.get(session_id, question) {
            tracing::debug!(session_id, "Answer served from cache");
            self.metrics.record_cache_hit();
            self.metrics.record_answer();
            return Ok(cached);
        }

        let index = self.store.load_or_build(session_id, None).await?;

        let mut vectors = self
            .embedding_client
            .generate_embeddings(vec![question.to_string()])
            .await?;
        let query_vector = vectors
            .pop()
            .ok_or_else(|| ChatError::Service("embedding provider returned no vectors".into()))?;
        if query_vector.len() != index.dimension {
            return Err(ChatError::Service(format!(
                "embedding dimension mismatch: index has {}, query has {}",
                index.dimension,
                query_vector.len()
            )));
        }

        let hits = index.top_k(&query_vector, self.top_k);
        let prompt = render_prompt(&hits, question);
        let answer = self.generation_client.generate(&prompt).await?;

        self.cache.set(session_id, question, answer.clone());
        self.metrics.record_answer();
        tracing::info!(session_id, retrieved = hits.len(), "Question answered");
        Ok(answer)
    }
}

fn render_prompt(hits: &[crate::index::ScoredChunk], question: &str) -> String {
    let context = hits
        .iter()
        .map(|hit| hit.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Use the context to answer concisely:\n{context}\nQuestion: {question}\nAnswer:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{IndexedChunk, compute_chunk_hash};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct UnitEmbedder;

    #[async_trait]
    impl EmbeddingClient for UnitEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerationClient for CountingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("Question:"));
            Ok("Generated answer".to_string())
        }
    }

    struct TestRig {
        engine: QaEngine,
        generator: Arc<CountingGenerator>,
        store: Arc<VectorIndexStore>,
        _dir: tempfile::TempDir,
    }

    fn rig(ttl: Duration) -> TestRig {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(VectorIndexStore::new(dir.path().to_path_buf()));
        let generator = Arc::new(CountingGenerator {
            calls: AtomicUsize::new(0),
        });
        let engine = QaEngine::new(
            Arc::new(UnitEmbedder),
            Arc::clone(&generator) as Arc<dyn GenerationClient>,
            Arc::clone(&store),
            QueryCache::new(ttl),
            Arc::new(ServerMetrics::new()),
            2,
        );
        TestRig {
            engine,
            generator,
            store,
            _dir: dir,
        }
    }

    async fn seed_index(store: &VectorIndexStore, session_id: &str) {
        let chunks = vec![
            IndexedChunk {
                text: "relevant chunk".into(),
                chunk_hash: compute_chunk_hash("relevant chunk"),
                vector: vec![1.0, 0.0],
            },
            IndexedChunk {
                text: "other chunk".into(),
                chunk_hash: compute_chunk_hash("other chunk"),
                vector: vec![0.0, 1.0],
            },
        ];
        store
            .load_or_build(session_id, Some(chunks))
            .await
            .expect("seed index");
    }

    #[tokio::test]
    async fn missing_index_surfaces_as_not_ready() {
        let rig = rig(Duration::from_secs(60));
        let error = rig
            .engine
            .answer("session-a", "What is this?")
            .await
            .expect_err("no index yet");
        assert!(matches!(error, ChatError::NotReady));
        assert_eq!(rig.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn repeated_question_within_ttl_generates_once() {
        let rig = rig(Duration::from_secs(60));
        seed_index(&rig.store, "session-a").await;

        let first = rig
            .engine
            .answer("session-a", "What is the summary?")
            .await
            .expect("first answer");
        let second = rig
            .engine
            .answer("session-a", "What is the summary?")
            .await
            .expect("second answer");

        assert_eq!(first, second);
        assert_eq!(rig.generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_cache_triggers_fresh_generation() {
        let rig = rig(Duration::from_millis(10));
        seed_index(&rig.store, "session-a").await;

        rig.engine
            .answer("session-a", "question")
            .await
            .expect("first answer");
        tokio::time::sleep(Duration::from_millis(25)).await;
        rig.engine
            .answer("session-a", "question")
            .await
            .expect("second answer");

        assert_eq!(rig.generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn different_sessions_do_not_share_answers() {
        let rig = rig(Duration::from_secs(60));
        seed_index(&rig.store, "session-a").await;
        seed_index(&rig.store, "session-b").await;

        rig.engine
            .answer("session-a", "question")
            .await
            .expect("a");
        rig.engine
            .answer("session-b", "question")
            .await
            .expect("b");
        assert_eq!(rig.generator.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn prompt_embeds_context_and_question() {
        let hits = vec![
            crate::index::ScoredChunk {
                text: "first".into(),
                score: 0.9,
            },
            crate::index::ScoredChunk {
                text: "second".into(),
                score: 0.5,
            },
        ];
        let prompt = render_prompt(&hits, "Why?");
        assert!(prompt.starts_with("Use the context to answer concisely:"));
        assert!(prompt.contains("first\n\nsecond"));
        assert!(prompt.ends_with("Question: Why?\nAnswer:"));
    }
}
