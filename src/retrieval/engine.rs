//! Retriever - chunk, embed and index a document; answer top-k queries

use super::{CancelToken, RetrievalResult};
use crate::chunking::{Chunk, Chunker};
use crate::config::Config;
use crate::document::{self, Document};
use crate::embeddings::Embedder;
use crate::error::{PipelineError, Result};
use crate::index::{build_index, IndexEntry, IndexKind, IndexMeta, IndexStore, VectorIndex};
use crate::retry::RetryPolicy;
use chrono::Utc;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Passages per embedding request during a build
const DEFAULT_BATCH_SIZE: usize = 32;

/// An index together with the description of how it was built
#[derive(Clone)]
pub struct IndexSnapshot {
    pub index: Arc<dyn VectorIndex>,
    pub meta: IndexMeta,
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

/// What `ensure_index` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    /// Persisted index matched the document and was loaded
    Reused,
    /// Document changed, or no index existed; rebuilt and persisted
    Rebuilt,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    kind: IndexKind,
    top_k: usize,
    min_score: Option<f32>,
    retry: RetryPolicy,
    batch_size: usize,
    active: RwLock<Option<IndexSnapshot>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chunker: Chunker,
        kind: IndexKind,
        top_k: usize,
    ) -> Result<Self> {
        if top_k == 0 {
            return Err(PipelineError::InvalidConfig(
                "retrieval.top_k must be at least 1".into(),
            ));
        }
        Ok(Self {
            embedder,
            chunker,
            kind,
            top_k,
            min_score: None,
            retry: RetryPolicy::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            active: RwLock::new(None),
        })
    }

    /// Retriever wired from validated configuration
    pub fn from_config(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        Ok(Self::new(
            embedder,
            config.chunker()?,
            config.index.index_kind(),
            config.retrieval.top_k,
        )?
        .with_min_score(config.retrieval.min_score)
        .with_retry(config.retry.policy()))
    }

    /// Drop hits scoring below `min_score`
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Currently active index, if any
    pub fn snapshot(&self) -> Option<IndexSnapshot> {
        self.active.read().clone()
    }

    fn install(&self, snapshot: IndexSnapshot) {
        let entries = snapshot.index.len();
        *self.active.write() = Some(snapshot);
        info!(entries, "index swapped in");
    }

    // =========================================================================
    // Build
    // =========================================================================

    /// Chunk, embed and index `document`, then make it the active index
    ///
    /// Any failure leaves the previously active index in place.
    pub fn build(&self, document: &Document) -> Result<IndexSnapshot> {
        let chunks = self.chunker.chunk(document);
        info!(
            document = %document.source.display(),
            chunks = chunks.len(),
            model = self.embedder.model_id(),
            "building index"
        );

        let vectors = self.embed_chunks(&chunks)?;
        let dimension = match self.embedder.dimension() {
            0 => vectors.first().map(Vec::len).unwrap_or_default(),
            d => d,
        };

        let entries: Vec<IndexEntry> = vectors
            .into_iter()
            .zip(chunks)
            .map(|(vector, chunk)| IndexEntry { vector, chunk })
            .collect();

        let meta = IndexMeta {
            model_id: self.embedder.model_id().to_string(),
            dimension,
            index_kind: self.kind.name().to_string(),
            document_id: document.id.clone(),
            document_source: document.source.display().to_string(),
            chunk_size: self.chunker.size(),
            chunk_overlap: self.chunker.overlap(),
            chunk_unit: self.chunker.unit().as_str().to_string(),
            entry_count: entries.len(),
            built_at: Utc::now(),
        };

        let index = build_index(self.kind, dimension, entries)?;
        let snapshot = IndexSnapshot { index, meta };
        self.install(snapshot.clone());
        Ok(snapshot)
    }

    /// Embed passages in fixed-size batches, batches in parallel
    fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

        let batches: Vec<Vec<Vec<f32>>> = texts
            .par_chunks(self.batch_size)
            .map(|batch| {
                let vectors = self
                    .retry
                    .run("embed batch", || self.embedder.embed_batch(batch))?;
                if vectors.len() != batch.len() {
                    return Err(PipelineError::embedding(format!(
                        "embedder returned {} vectors for {} passages",
                        vectors.len(),
                        batch.len()
                    )));
                }
                Ok(vectors)
            })
            .collect::<Result<_>>()?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        debug!(vectors = vectors.len(), "passages embedded");
        Ok(vectors)
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Save the active index to `path`
    pub fn persist(&self, path: &Path) -> Result<()> {
        let snapshot = self
            .snapshot()
            .ok_or_else(|| PipelineError::Storage("no index to persist".into()))?;
        IndexStore::new(path).save(&snapshot.meta, snapshot.index.entries())
    }

    /// Load a persisted index built with the configured embedder and make it active
    pub fn load(&self, path: &Path) -> Result<IndexSnapshot> {
        let persisted =
            IndexStore::new(path).load(self.embedder.model_id(), self.embedder.dimension())?;
        let index = build_index(self.kind, persisted.meta.dimension, persisted.entries)?;
        let snapshot = IndexSnapshot {
            index,
            meta: persisted.meta,
        };
        self.install(snapshot.clone());
        Ok(snapshot)
    }

    /// Reuse the persisted index if it was built from this exact document
    /// with the current chunking, otherwise rebuild and persist
    ///
    /// A stored index from another embedding model is an error, not a
    /// reason to rebuild.
    pub fn ensure_index(
        &self,
        document_path: &Path,
        index_path: &Path,
    ) -> Result<(IndexSnapshot, IndexStatus)> {
        let (format, document_id) = document::fingerprint(document_path)?;
        let store = IndexStore::new(index_path);

        if store.exists() {
            let meta = store.read_meta()?;
            if meta.model_id != self.embedder.model_id() {
                return Err(PipelineError::IndexModelMismatch {
                    stored: meta.model_id,
                    configured: self.embedder.model_id().to_string(),
                });
            }
            if meta.document_id == document_id && self.chunking_matches(&meta) {
                debug!(index = %index_path.display(), "persisted index is current");
                return Ok((self.load(index_path)?, IndexStatus::Reused));
            }
            info!(
                document = %document_path.display(),
                "document or chunking changed, rebuilding index"
            );
        }

        let document = document::load(document_path, format)?;
        let snapshot = self.build(&document)?;
        store.save(&snapshot.meta, snapshot.index.entries())?;
        Ok((snapshot, IndexStatus::Rebuilt))
    }

    fn chunking_matches(&self, meta: &IndexMeta) -> bool {
        meta.chunk_size == self.chunker.size()
            && meta.chunk_overlap == self.chunker.overlap()
            && meta.chunk_unit == self.chunker.unit().as_str()
    }

    // =========================================================================
    // Query
    // =========================================================================

    /// Top-`k` chunks for `text`
    pub fn query(&self, text: &str, k: usize) -> Result<RetrievalResult> {
        self.query_with_cancel(text, k, &CancelToken::new())
    }

    /// Top-k with the configured default k
    pub fn query_default(&self, text: &str) -> Result<RetrievalResult> {
        self.query(text, self.top_k)
    }

    pub fn query_with_cancel(
        &self,
        text: &str,
        k: usize,
        cancel: &CancelToken,
    ) -> Result<RetrievalResult> {
        if text.trim().is_empty() {
            return Err(PipelineError::InvalidQuery("query text is empty".into()));
        }
        if k == 0 {
            return Err(PipelineError::InvalidQuery("k must be at least 1".into()));
        }

        let vector = self
            .retry
            .run("embed query", || self.embedder.embed_query(text))?;

        if cancel.is_cancelled() {
            debug!("query cancelled before search");
            return Err(PipelineError::Cancelled);
        }

        let snapshot = match self.snapshot() {
            Some(snapshot) => snapshot,
            None => {
                warn!("query against an empty retriever; build or load an index first");
                return Ok(RetrievalResult {
                    query: text.to_string(),
                    hits: Vec::new(),
                });
            }
        };

        let mut hits = snapshot.index.search(&vector, k)?;
        if let Some(min) = self.min_score {
            hits.retain(|hit| hit.score >= min);
        }

        debug!(
            k,
            hits = hits.len(),
            best = hits.first().map(|h| h.score),
            "query answered"
        );
        Ok(RetrievalResult {
            query: text.to_string(),
            hits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkUnit;
    use crate::embeddings::HashedEmbedder;
    use crate::index::HnswParams;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn retriever(kind: IndexKind) -> Retriever {
        Retriever::new(
            Arc::new(HashedEmbedder::new()),
            Chunker::new(10, 2, ChunkUnit::Tokens).unwrap(),
            kind,
            3,
        )
        .unwrap()
    }

    fn squats() -> Document {
        Document::from_pages(
            "plan.txt",
            &["Squats build leg strength. Bench press builds chest strength."],
        )
        .unwrap()
    }

    /// Fails with a transient error a fixed number of times, then delegates
    struct Flaky {
        inner: HashedEmbedder,
        failures_left: AtomicUsize,
    }

    impl Embedder for Flaky {
        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(PipelineError::embedding_transient("503 service unavailable"));
            }
            self.inner.embed(text)
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
    }

    struct Broken;

    impl Embedder for Broken {
        fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(PipelineError::embedding("401 unauthorized"))
        }
        fn dimension(&self) -> usize {
            384
        }
        fn model_id(&self) -> &str {
            "broken"
        }
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let result = Retriever::new(
            Arc::new(HashedEmbedder::new()),
            Chunker::new(10, 2, ChunkUnit::Tokens).unwrap(),
            IndexKind::Flat,
            0,
        );
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_build_and_query_leg_exercises() {
        let retriever = retriever(IndexKind::Flat);
        let snapshot = retriever.build(&squats()).unwrap();
        assert_eq!(snapshot.index.len(), 2);

        let result = retriever.query("leg exercises", 1).unwrap();
        assert_eq!(result.len(), 1);
        assert!(result.hits[0].chunk.text.starts_with("Squats build leg strength"));
    }

    #[test]
    fn test_batch_size_does_not_change_entries() {
        let document = Document::from_pages(
            "plan.txt",
            &["Squats build leg strength. Lunges train each leg alone. \
               Bench press builds chest strength. Rows build the upper back."],
        )
        .unwrap();
        let batched = retriever(IndexKind::Flat);
        let single = retriever(IndexKind::Flat).with_batch_size(1);

        let a = batched.build(&document).unwrap();
        let b = single.build(&document).unwrap();
        assert!(a.index.len() > 1);
        assert_eq!(a.index.entries(), b.index.entries());

        let best = single.query("upper back rows", 3).unwrap();
        assert_eq!(best.top(), batched.query("upper back rows", 3).unwrap().hits.first());
        assert!(best.top().unwrap().chunk.text.contains("Rows"));
    }

    #[test]
    fn test_invalid_queries() {
        let retriever = retriever(IndexKind::Flat);
        retriever.build(&squats()).unwrap();
        assert!(matches!(retriever.query("   ", 3), Err(PipelineError::InvalidQuery(_))));
        assert!(matches!(retriever.query("squats", 0), Err(PipelineError::InvalidQuery(_))));
    }

    #[test]
    fn test_query_default_uses_top_k() {
        let retriever = retriever(IndexKind::Flat);
        retriever.build(&squats()).unwrap();
        // two chunks, top_k 3
        assert_eq!(retriever.query_default("strength").unwrap().len(), 2);
    }

    #[test]
    fn test_min_score_filters_hits() {
        let retriever = retriever(IndexKind::Flat).with_min_score(Some(0.99));
        retriever.build(&squats()).unwrap();
        assert!(retriever.query("leg exercises", 2).unwrap().is_empty());
    }

    #[test]
    fn test_cancelled_query_returns_cancelled() {
        let retriever = retriever(IndexKind::Flat);
        retriever.build(&squats()).unwrap();

        let token = CancelToken::new();
        token.cancel();
        assert!(matches!(
            retriever.query_with_cancel("squats", 1, &token),
            Err(PipelineError::Cancelled)
        ));
    }

    #[test]
    fn test_failed_build_keeps_previous_index() {
        let retriever = retriever(IndexKind::Flat);
        retriever.build(&squats()).unwrap();

        let broken = Retriever {
            embedder: Arc::new(Broken),
            ..retriever
        };
        let other = Document::from_pages("other.txt", &["Rowing builds back strength."]).unwrap();
        assert!(broken.build(&other).is_err());

        let active = broken.snapshot().unwrap();
        assert_eq!(active.meta.document_id, squats().id);
    }

    #[test]
    fn test_transient_embedding_errors_retried() {
        let flaky = Flaky {
            inner: HashedEmbedder::new(),
            failures_left: AtomicUsize::new(2),
        };
        let retriever = Retriever::new(
            Arc::new(flaky),
            Chunker::new(10, 2, ChunkUnit::Tokens).unwrap(),
            IndexKind::Flat,
            3,
        )
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        });

        retriever.build(&squats()).unwrap();
        assert_eq!(retriever.query("leg", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_persist_and_load_rank_identically() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");

        let original = retriever(IndexKind::Flat);
        original.build(&squats()).unwrap();
        original.persist(&path).unwrap();
        let before = original.query("chest strength", 2).unwrap();

        let restored = retriever(IndexKind::Flat);
        restored.load(&path).unwrap();
        assert_eq!(restored.query("chest strength", 2).unwrap(), before);
    }

    #[test]
    fn test_load_can_switch_index_kind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.db");

        let flat = retriever(IndexKind::Flat);
        flat.build(&squats()).unwrap();
        flat.persist(&path).unwrap();

        let hnsw = retriever(IndexKind::Hnsw(HnswParams::default()));
        let snapshot = hnsw.load(&path).unwrap();
        assert_eq!(snapshot.index.kind().name(), "hnsw");
        assert_eq!(
            hnsw.query("leg", 1).unwrap().hits[0].chunk.index,
            flat.query("leg", 1).unwrap().hits[0].chunk.index
        );
    }

    #[test]
    fn test_persist_without_index_fails() {
        let dir = TempDir::new().unwrap();
        let err = retriever(IndexKind::Flat)
            .persist(&dir.path().join("index.db"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }

    #[test]
    fn test_ensure_index_reuses_until_document_changes() {
        let dir = TempDir::new().unwrap();
        let doc_path = dir.path().join("guide.txt");
        let index_path = dir.path().join("index.db");
        std::fs::write(&doc_path, "Squats build leg strength.").unwrap();

        let retriever = retriever(IndexKind::Flat);
        let (_, status) = retriever.ensure_index(&doc_path, &index_path).unwrap();
        assert_eq!(status, IndexStatus::Rebuilt);

        let (_, status) = retriever.ensure_index(&doc_path, &index_path).unwrap();
        assert_eq!(status, IndexStatus::Reused);

        std::fs::write(&doc_path, "Lunges build leg strength too.").unwrap();
        let (snapshot, status) = retriever.ensure_index(&doc_path, &index_path).unwrap();
        assert_eq!(status, IndexStatus::Rebuilt);
        assert!(snapshot.index.entries()[0].chunk.text.starts_with("Lunges"));
    }
}
