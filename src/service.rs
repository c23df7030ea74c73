//! Service wiring shared by all surfaces.
//!
//! `DocumentService` owns the long-lived components (session registry,
//! ingestion pipeline, index store, QA engine, metrics) so every HTTP handler
//! works against the same state. Construct it once near process start and
//! share it through an `Arc`.

use crate::{
    cache::QueryCache,
    config::get_config,
    embedding::{EmbeddingClient, get_embedding_client},
    extract::PdfLoader,
    generation::{GenerationClient, get_generation_client},
    index::VectorIndexStore,
    ingestion::IngestionPipeline,
    metrics::{MetricsSnapshot, ServerMetrics},
    qa::{ChatError, QaEngine},
    sessions::{SessionRegistry, SessionSnapshot, SessionStatus},
};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while accepting an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The uploaded document could not be written to disk.
    #[error("failed to store upload: {0}")]
    Storage(#[from] std::io::Error),
}

/// Abstraction over the document service used by external surfaces.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Persist an uploaded document, create its session, and start ingestion.
    async fn create_session(&self, bytes: Vec<u8>) -> Result<String, UploadError>;

    /// Look up the lifecycle state of a session.
    fn session_status(&self, session_id: &str) -> Option<SessionSnapshot>;

    /// Answer a question against a session's ingested document.
    async fn answer(&self, session_id: &str, question: &str) -> Result<String, ChatError>;

    /// Retrieve the current metrics snapshot for diagnostics.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Coordinates uploads, ingestion, and question answering.
pub struct DocumentService {
    sessions: Arc<SessionRegistry>,
    ingestion: Arc<IngestionPipeline>,
    qa: QaEngine,
    metrics: Arc<ServerMetrics>,
    upload_dir: PathBuf,
}

impl DocumentService {
    /// Build the service from the loaded configuration.
    pub async fn new() -> Self {
        let config = get_config();
        tracing::info!("Initializing capability clients");
        let embedding_client: Arc<dyn EmbeddingClient> = Arc::from(get_embedding_client());
        let generation_client: Arc<dyn GenerationClient> = Arc::from(get_generation_client());

        let metrics = Arc::new(ServerMetrics::new());
        let sessions = Arc::new(SessionRegistry::new());
        let store = Arc::new(VectorIndexStore::new(PathBuf::from(&config.index_dir)));

        let ingestion = Arc::new(IngestionPipeline::new(
            Arc::new(PdfLoader::new()),
            Arc::clone(&embedding_client),
            Arc::clone(&store),
            Arc::clone(&sessions),
            Arc::clone(&metrics),
            config.chunk_size,
            config.chunk_overlap,
        ));

        let qa = QaEngine::new(
            embedding_client,
            generation_client,
            store,
            QueryCache::new(Duration::from_secs(config.query_cache_ttl_secs)),
            Arc::clone(&metrics),
            config.retrieval_top_k,
        );

        Self {
            sessions,
            ingestion,
            qa,
            metrics,
            upload_dir: PathBuf::from(&config.upload_dir),
        }
    }

    /// Assemble a service from explicit components.
    pub fn with_components(
        sessions: Arc<SessionRegistry>,
        ingestion: Arc<IngestionPipeline>,
        qa: QaEngine,
        metrics: Arc<ServerMetrics>,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            sessions,
            ingestion,
            qa,
            metrics,
            upload_dir,
        }
    }
}

#[async_trait]
impl ChatApi for DocumentService {
    async fn create_session(&self, bytes: Vec<u8>) -> Result<String, UploadError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let session_id = Uuid::new_v4().to_string();
        // uploads are stored as UPLOAD_DIR/<session_id>.pdf
        let document_path = self.upload_dir.join(format!("{session_id}.pdf"));
        tokio::fs::write(&document_path, bytes).await?;

        self.sessions.create(&session_id, &document_path);
        Arc::clone(&self.ingestion).ingest(session_id.clone(), document_path);
        Ok(session_id)
    }

    fn session_status(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.get(session_id)
    }

    async fn answer(&self, session_id: &str, question: &str) -> Result<String, ChatError> {
        // Gate on session state before touching the index so an unknown id is
        // a 404 and an in-progress ingestion is a retry-later, not a failure.
        let snapshot = self.sessions.get(session_id).ok_or(ChatError::NotFound)?;
        match snapshot.status {
            SessionStatus::Processing => return Err(ChatError::NotReady),
            SessionStatus::Error => {
                let detail = snapshot
                    .error_detail
                    .unwrap_or_else(|| "document ingestion failed".to_string());
                return Err(ChatError::Service(detail));
            }
            SessionStatus::Ready => {}
        }
        self.qa.answer(session_id, question).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
