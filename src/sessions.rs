//! Upload session lifecycle tracking.
//!
//! Each upload gets a session that moves through exactly one of two paths:
//! `Processing -> Ready` or `Processing -> Error`. Terminal states are never
//! left, and an invalid transition is logged rather than propagated so a
//! misbehaving caller cannot corrupt another session's state.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Lifecycle state of an uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Ingestion is in progress.
    Processing,
    /// Ingestion completed and the session can be queried.
    Ready,
    /// Ingestion failed; the detail is available via the status endpoint.
    Error,
}

#[derive(Debug, Clone)]
struct Session {
    status: SessionStatus,
    source_path: PathBuf,
    error_detail: Option<String>,
}

/// Read-only view of a session handed to API consumers.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Path of the uploaded source document.
    pub source_path: PathBuf,
    /// Failure detail, present only when the status is [`SessionStatus::Error`].
    pub error_detail: Option<String>,
}

/// In-memory registry owning all session records.
///
/// State is ephemeral by design; sessions live for the process lifetime and
/// are never explicitly destroyed.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fresh session in the `Processing` state under the given id.
    ///
    /// Callers own id allocation so the same id can also name derived
    /// artifacts such as the stored upload. A duplicate id is rejected
    /// rather than resetting the existing session.
    pub fn create(&self, session_id: &str, source_path: &Path) {
        let mut guard = self.sessions.lock().expect("session registry poisoned");
        if guard.contains_key(session_id) {
            tracing::warn!(session_id = %session_id, "Ignoring duplicate session id");
            return;
        }
        guard.insert(
            session_id.to_string(),
            Session {
                status: SessionStatus::Processing,
                source_path: source_path.to_path_buf(),
                error_detail: None,
            },
        );
        tracing::info!(session_id = %session_id, path = %source_path.display(), "Session created");
    }

    /// Look up a session by id.
    pub fn get(&self, session_id: &str) -> Option<SessionSnapshot> {
        let guard = self.sessions.lock().expect("session registry poisoned");
        guard.get(session_id).map(|session| SessionSnapshot {
            status: session.status,
            source_path: session.source_path.clone(),
            error_detail: session.error_detail.clone(),
        })
    }

    /// Transition a session from `Processing` to `Ready`.
    pub fn mark_ready(&self, session_id: &str) {
        self.transition(session_id, SessionStatus::Ready, None);
    }

    /// Transition a session from `Processing` to `Error`, recording the detail.
    pub fn mark_error(&self, session_id: &str, detail: String) {
        self.transition(session_id, SessionStatus::Error, Some(detail));
    }

    fn transition(&self, session_id: &str, target: SessionStatus, detail: Option<String>) {
        let mut guard = self.sessions.lock().expect("session registry poisoned");
        match guard.get_mut(session_id) {
            Some(session) if session.status == SessionStatus::Processing => {
                session.status = target;
                session.error_detail = detail;
                tracing::info!(session_id = %session_id, status = ?target, "Session transitioned");
            }
            Some(session) => {
                tracing::warn!(
                    session_id = %session_id,
                    current = ?session.status,
                    requested = ?target,
                    "Ignoring transition out of a terminal session state"
                );
            }
            None => {
                tracing::warn!(session_id = %session_id, requested = ?target, "Ignoring transition for unknown session");
            }
        }
    }
}
