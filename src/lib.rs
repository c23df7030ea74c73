#![deny(missing_docs)]

//! Core library for the DocuChat RAG server.

/// HTTP routing and REST handlers.
pub mod api;
/// Query-response TTL cache.
pub mod cache;
/// Fixed-size overlapping text chunking.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Document text extraction.
pub mod extract;
/// Answer generation client abstraction and adapters.
pub mod generation;
/// Per-session vector index and its persistence store.
pub mod index;
/// Background document ingestion pipeline.
pub mod ingestion;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and query metrics helpers.
pub mod metrics;
/// Retrieval-augmented question answering.
pub mod qa;
/// Service wiring shared by all surfaces.
pub mod service;
/// Upload session lifecycle registry.
pub mod sessions;
