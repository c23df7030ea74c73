//! Background document ingestion.
//!
//! `ingest` is fire-and-forget: the caller gets no handle and observes the
//! outcome through the session registry. At most one ingestion runs per
//! document path (single-flight); the check and the registration happen under
//! one lock acquisition so two concurrent requests cannot both pass the
//! check. The in-flight entry is removed by a drop guard on every exit path.

use crate::{
    chunking::{ChunkingError, chunk_text},
    embedding::{EmbeddingClient, EmbeddingClientError},
    extract::{DocumentLoader, ExtractError},
    index::{IndexError, IndexedChunk, VectorIndexStore, compute_chunk_hash},
    metrics::ServerMetrics,
    sessions::SessionRegistry,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors raised while ingesting a document.
///
/// All variants collapse into the owning session's error detail; they are
/// never propagated to an HTTP caller.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Document could not be read or parsed.
    #[error("Failed to extract document text: {0}")]
    Extract(#[from] ExtractError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingClientError),
    /// Index build or persistence failed.
    #[error("Failed to build index: {0}")]
    Index(#[from] IndexError),
}

/// Turns an uploaded document into a persisted per-session index.
pub struct IngestionPipeline {
    loader: Arc<dyn DocumentLoader>,
    embedding_client: Arc<dyn EmbeddingClient>,
    store: Arc<VectorIndexStore>,
    sessions: Arc<SessionRegistry>,
    metrics: Arc<ServerMetrics>,
    chunk_size: usize,
    chunk_overlap: usize,
    // document path -> session that owns the running ingestion
    in_flight: Mutex<HashMap<PathBuf, String>>,
}

impl IngestionPipeline {
    /// Assemble a pipeline from its collaborators.
    pub fn new(
        loader: Arc<dyn DocumentLoader>,
        embedding_client: Arc<dyn EmbeddingClient>,
        store: Arc<VectorIndexStore>,
        sessions: Arc<SessionRegistry>,
        metrics: Arc<ServerMetrics>,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Self {
        Self {
            loader,
            embedding_client,
            store,
            sessions,
            metrics,
            chunk_size,
            chunk_overlap,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Start ingesting a document in the background.
    ///
    /// Returns immediately. A repeated call for the ingestion that is
    /// already in flight is a no-op; the owning session still receives the
    /// outcome. A different session handing in a path that is already owned
    /// is marked `Error` right away so it cannot stay `Processing` forever.
    pub fn ingest(self: Arc<Self>, session_id: String, document_path: PathBuf) {
        {
            let mut guard = self.in_flight.lock().expect("in-flight map poisoned");
            match guard.get(&document_path) {
                Some(owner) if *owner == session_id => {
                    tracing::debug!(
                        session_id = %session_id,
                        path = %document_path.display(),
                        "Ingestion already in flight; skipping"
                    );
                    return;
                }
                Some(owner) => {
                    tracing::warn!(
                        session_id = %session_id,
                        owner = %owner,
                        path = %document_path.display(),
                        "Document is already being ingested for another session"
                    );
                    self.sessions.mark_error(
                        &session_id,
                        "document is already being ingested by another session".to_string(),
                    );
                    return;
                }
                None => {
                    guard.insert(document_path.clone(), session_id.clone());
                }
            }
        }

        let pipeline = self;
        tokio::spawn(async move {
            let _in_flight = InFlightGuard {
                pipeline: Arc::clone(&pipeline),
                path: document_path.clone(),
            };

            match pipeline.run(&session_id, &document_path).await {
                Ok(chunk_count) => {
                    pipeline.metrics.record_ingestion(chunk_count as u64);
                    pipeline.sessions.mark_ready(&session_id);
                }
                Err(error) => {
                    tracing::warn!(
                        session_id = %session_id,
                        path = %document_path.display(),
                        error = %error,
                        "Ingestion failed"
                    );
                    pipeline.sessions.mark_error(&session_id, error.to_string());
                }
            }
        });
    }

    async fn run(&self, session_id: &str, document_path: &Path) -> Result<usize, IngestError> {
        tracing::info!(session_id, path = %document_path.display(), "Ingesting document");
        let text = self.loader.load_text(document_path).await?;
        let chunks = chunk_text(&text, self.chunk_size, self.chunk_overlap)?;
        let (prepared, skipped_duplicates) = dedupe_chunks(chunks);

        let texts: Vec<String> = prepared.iter().map(|(text, _)| text.clone()).collect();
        let embeddings = self.embedding_client.generate_embeddings(texts).await?;
        debug_assert_eq!(prepared.len(), embeddings.len());

        let indexed: Vec<IndexedChunk> = prepared
            .into_iter()
            .zip(embeddings)
            .map(|((text, chunk_hash), vector)| IndexedChunk {
                text,
                chunk_hash,
                vector,
            })
            .collect();
        let chunk_count = indexed.len();

        self.store
            .load_or_build(session_id, Some(indexed))
            .await?;

        tracing::info!(
            session_id,
            chunks = chunk_count,
            skipped_duplicates,
            "Document ingested"
        );
        Ok(chunk_count)
    }
}

struct InFlightGuard {
    pipeline: Arc<IngestionPipeline>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut guard = self
            .pipeline
            .in_flight
            .lock()
            .expect("in-flight map poisoned");
        guard.remove(&self.path);
    }
}

/// Remove duplicate chunks within a document, keeping the first occurrence.
fn dedupe_chunks(chunks: Vec<String>) -> (Vec<(String, String)>, usize) {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();
    let mut skipped = 0;

    for text in chunks {
        if text.trim().is_empty() {
            continue;
        }
        let hash = compute_chunk_hash(&text);
        if seen.insert(hash.clone()) {
            prepared.push((text, hash));
        } else {
            skipped += 1;
        }
    }

    (prepared, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sessions::SessionStatus;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubLoader {
        text: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubLoader {
        fn returning(text: &str) -> Self {
            Self {
                text: Some(text.to_string()),
                delay: Duration::from_millis(20),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                text: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentLoader for StubLoader {
        async fn load_text(&self, _path: &Path) -> Result<String, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.text.clone().ok_or(ExtractError::Empty)
        }
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingClient for CountingEmbedder {
        async fn generate_embeddings(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    struct TestRig {
        pipeline: Arc<IngestionPipeline>,
        sessions: Arc<SessionRegistry>,
        loader: Arc<StubLoader>,
        embedder: Arc<CountingEmbedder>,
        _dir: tempfile::TempDir,
    }

    fn rig(loader: StubLoader) -> TestRig {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions = Arc::new(SessionRegistry::new());
        let loader = Arc::new(loader);
        let embedder = Arc::new(CountingEmbedder::new());
        let store = Arc::new(VectorIndexStore::new(dir.path().to_path_buf()));
        let pipeline = Arc::new(IngestionPipeline::new(
            Arc::clone(&loader) as Arc<dyn DocumentLoader>,
            Arc::clone(&embedder) as Arc<dyn EmbeddingClient>,
            store,
            Arc::clone(&sessions),
            Arc::new(ServerMetrics::new()),
            4,
            1,
        ));
        TestRig {
            pipeline,
            sessions,
            loader,
            embedder,
            _dir: dir,
        }
    }

    async fn wait_for_terminal(sessions: &SessionRegistry, session_id: &str) -> SessionStatus {
        for _ in 0..200 {
            if let Some(snapshot) = sessions.get(session_id) {
                if snapshot.status != SessionStatus::Processing {
                    return snapshot.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("session {session_id} never reached a terminal state");
    }

    fn new_session(sessions: &SessionRegistry, id: &str, path: &Path) -> String {
        sessions.create(id, path);
        id.to_string()
    }

    #[tokio::test]
    async fn successful_ingestion_marks_session_ready() {
        let rig = rig(StubLoader::returning("alpha beta gamma delta epsilon"));
        let path = PathBuf::from("/uploads/doc.pdf");
        let session_id = new_session(&rig.sessions, "doc-session", &path);

        Arc::clone(&rig.pipeline).ingest(session_id.clone(), path);
        let status = wait_for_terminal(&rig.sessions, &session_id).await;
        assert_eq!(status, SessionStatus::Ready);
        assert_eq!(rig.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_requests_for_same_document_run_once() {
        let rig = rig(StubLoader::returning("some document text to index"));
        let path = PathBuf::from("/uploads/shared.pdf");
        let session_id = new_session(&rig.sessions, "shared-session", &path);

        Arc::clone(&rig.pipeline).ingest(session_id.clone(), path.clone());
        Arc::clone(&rig.pipeline).ingest(session_id.clone(), path.clone());
        Arc::clone(&rig.pipeline).ingest(session_id.clone(), path);

        let status = wait_for_terminal(&rig.sessions, &session_id).await;
        assert_eq!(status, SessionStatus::Ready);
        assert_eq!(rig.loader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_session_for_an_owned_path_is_marked_error() {
        let rig = rig(StubLoader::returning("slow enough to still be running"));
        let path = PathBuf::from("/uploads/contested.pdf");
        let owner = new_session(&rig.sessions, "owner-session", &path);
        let latecomer = new_session(&rig.sessions, "late-session", &path);

        Arc::clone(&rig.pipeline).ingest(owner.clone(), path.clone());
        Arc::clone(&rig.pipeline).ingest(latecomer.clone(), path);

        // the latecomer is failed synchronously, before the owner finishes
        let snapshot = rig.sessions.get(&latecomer).expect("latecomer session");
        assert_eq!(snapshot.status, SessionStatus::Error);
        assert!(
            snapshot
                .error_detail
                .expect("detail")
                .contains("another session")
        );

        let status = wait_for_terminal(&rig.sessions, &owner).await;
        assert_eq!(status, SessionStatus::Ready);
        assert_eq!(rig.loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_marks_session_error_with_detail() {
        let rig = rig(StubLoader::failing());
        let path = PathBuf::from("/uploads/broken.pdf");
        let session_id = new_session(&rig.sessions, "broken-session", &path);

        Arc::clone(&rig.pipeline).ingest(session_id.clone(), path);
        let status = wait_for_terminal(&rig.sessions, &session_id).await;
        assert_eq!(status, SessionStatus::Error);
        let detail = rig
            .sessions
            .get(&session_id)
            .expect("session")
            .error_detail
            .expect("detail");
        assert!(detail.contains("extract"));
        assert_eq!(rig.embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn in_flight_entry_is_released_after_failure() {
        let rig = rig(StubLoader::failing());
        let path = PathBuf::from("/uploads/retry.pdf");

        let first = new_session(&rig.sessions, "first-attempt", &path);
        Arc::clone(&rig.pipeline).ingest(first.clone(), path.clone());
        wait_for_terminal(&rig.sessions, &first).await;

        // a fresh request for the same path must be able to start again
        let second = new_session(&rig.sessions, "second-attempt", &path);
        Arc::clone(&rig.pipeline).ingest(second.clone(), path);
        wait_for_terminal(&rig.sessions, &second).await;
        assert_eq!(rig.loader.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn dedupe_chunks_skips_repeats_and_blanks() {
        let (prepared, skipped) = dedupe_chunks(vec![
            "alpha".into(),
            "  ".into(),
            "beta".into(),
            "alpha".into(),
        ]);
        let texts: Vec<&str> = prepared.iter().map(|(text, _)| text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "beta"]);
        assert_eq!(skipped, 1);
        assert_ne!(prepared[0].1, prepared[1].1);
    }
}
