//! Time-bounded cache for generated answers.
//!
//! Entries are keyed by `(session_id, normalized question)` so answers never
//! leak across documents. Expiry is passive: a stale entry is evicted when it
//! is next read. Capacity is bounded only by time.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    session_id: String,
    question: String,
}

struct CacheEntry {
    answer: String,
    inserted_at: Instant,
}

/// TTL cache mapping questions to previously generated answers.
pub struct QueryCache {
    ttl: Duration,
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl QueryCache {
    /// Create a cache whose entries expire `ttl` after insertion.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached answer for a question, if one exists within its TTL.
    ///
    /// A stale entry is removed and reported as a miss.
    pub fn get(&self, session_id: &str, question: &str) -> Option<String> {
        let key = self.key(session_id, question);
        let mut guard = self.entries.lock().expect("query cache poisoned");
        match guard.get(&key) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => Some(entry.answer.clone()),
            Some(_) => {
                guard.remove(&key);
                tracing::debug!(session_id, "Evicted expired cache entry");
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite an answer, resetting its TTL clock.
    pub fn set(&self, session_id: &str, question: &str, answer: String) {
        let key = self.key(session_id, question);
        let mut guard = self.entries.lock().expect("query cache poisoned");
        guard.insert(
            key,
            CacheEntry {
                answer,
                inserted_at: Instant::now(),
            },
        );
    }

    fn key(&self, session_id: &str, question: &str) -> CacheKey {
        CacheKey {
            session_id: session_id.to_string(),
            question: normalize_question(question),
        }
    }
}

/// Collapse case and interior whitespace so trivially re-phrased questions hit.
fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}
