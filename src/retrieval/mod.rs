//! Retrieval module - build, persist and query the chunk index
//!
//! Public interface:
//! - [`Retriever`] owns the embedder, chunker and the active index
//! - [`RetrievalResult`] ordered hits for one query
//! - [`CancelToken`] lets a caller abandon a query in flight
//!
//! The active index is replaced only after a complete build or load. Queries
//! hold an `Arc` to whichever index was active when they started searching,
//! so a swap never disturbs them.

mod engine;

pub use engine::{IndexSnapshot, IndexStatus, Retriever};

use crate::index::ScoredChunk;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Ranked chunks for one query, best first, at most `k` long
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.hits.iter()
    }

    pub fn top(&self) -> Option<&ScoredChunk> {
        self.hits.first()
    }
}

/// Shared cancellation flag
///
/// Checked once the query embedding returns and before the index is searched.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_shared_between_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }
}
