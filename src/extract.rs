//! Text extraction from uploaded documents.
//!
//! Ingestion consumes extraction through the [`DocumentLoader`] trait so the
//! pipeline can be exercised with stub documents in tests. The production
//! implementation reads the stored upload and extracts plain UTF-8 text with
//! `pdf-extract`.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors raised while loading document text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The stored upload could not be read from disk.
    #[error("failed to read document {path}: {source}")]
    Unreadable {
        /// Path of the document we attempted to read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The document bytes could not be parsed as a PDF.
    #[error("PDF extraction failed: {0}")]
    Parse(String),
    /// Parsing succeeded but produced no usable text.
    #[error("document contains no extractable text")]
    Empty,
}

/// Interface implemented by document text extractors.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Load the document at `path` and return its plain text.
    async fn load_text(&self, path: &Path) -> Result<String, ExtractError>;
}

/// PDF-backed loader used in production.
#[derive(Default)]
pub struct PdfLoader;

impl PdfLoader {
    /// Construct a new PDF loader.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    async fn load_text(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractError::Unreadable {
                path: path.display().to_string(),
                source,
            })?;

        // Parsing is CPU-bound; keep it off the async workers.
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|error| ExtractError::Parse(error.to_string()))
        })
        .await
        .map_err(|join_error| ExtractError::Parse(join_error.to_string()))??;

        if text.trim().is_empty() {
            return Err(ExtractError::Empty);
        }
        tracing::debug!(path = %path.display(), bytes = text.len(), "Extracted document text");
        Ok(text)
    }
}
