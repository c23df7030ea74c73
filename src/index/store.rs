//! Load-or-build persistence for per-session indexes.

use super::{IndexError, IndexedChunk, VectorIndex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex as AsyncMutex;

/// Manages one persisted index file per session under a fixed directory.
///
/// The load-else-build-and-persist sequence spans suspension points, so two
/// racing builders for the same session could each build and the later save
/// would silently discard the earlier one. The store serializes that critical
/// section with a per-session async lock; loading a stable persisted index
/// needs no coordination beyond it.
pub struct VectorIndexStore {
    dir: PathBuf,
    build_locks: StdMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl VectorIndexStore {
    /// Create a store persisting indexes under `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            build_locks: StdMutex::new(HashMap::new()),
        }
    }

    /// Load the session's persisted index, or build and persist one from the
    /// supplied chunks.
    ///
    /// An existing index always wins; supplied chunks are ignored in that
    /// case. With no persisted index and no chunks this fails with
    /// [`IndexError::NotFound`], the signal the QA engine maps to "not ready".
    pub async fn load_or_build(
        &self,
        session_id: &str,
        chunks: Option<Vec<IndexedChunk>>,
    ) -> Result<VectorIndex, IndexError> {
        let lock = self.build_lock(session_id);
        let _guard = lock.lock().await;

        let path = self.index_path(session_id);
        if file_exists(&path).await {
            return load_index(&path).await;
        }

        let Some(chunks) = chunks else {
            return Err(IndexError::NotFound);
        };

        let dimension = chunks.first().map(|chunk| chunk.vector.len()).unwrap_or(0);
        let index = VectorIndex::build(dimension, chunks)?;
        persist_index(&path, &index).await?;
        tracing::info!(
            session_id,
            chunks = index.chunks.len(),
            path = %path.display(),
            "Index built and persisted"
        );
        Ok(index)
    }

    fn index_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    fn build_lock(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut guard = self.build_locks.lock().expect("index store lock poisoned");
        guard
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn load_index(path: &Path) -> Result<VectorIndex, IndexError> {
    let data = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| IndexError::Storage {
            path: path.display().to_string(),
            source,
        })?;
    serde_json::from_str(&data).map_err(|source| IndexError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

/// Write to a sibling temp file first so a crash mid-write never leaves a
/// half-written index behind.
async fn persist_index(path: &Path, index: &VectorIndex) -> Result<(), IndexError> {
    let storage_error = |source: std::io::Error| IndexError::Storage {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(storage_error)?;
    }

    let data = serde_json::to_string(index).map_err(|source| IndexError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;

    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(storage_error)?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(storage_error)
}
