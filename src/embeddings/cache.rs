//! Shared embedding cache
//!
//! Keyed by (model id, SHA-256 of role + text). Readers share a read lock;
//! inserts take a short write lock. Values are deterministic per key, so a
//! concurrent double insert is harmless (last writer wins).

use super::{Embedder, Role};
use crate::error::{PipelineError, Result};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    digest: [u8; 32],
}

impl CacheKey {
    fn new(model: &str, role: Role, text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(role.tag().as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        Self {
            model: model.to_string(),
            digest: hasher.finalize().into(),
        }
    }
}

#[derive(Default)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<CacheKey, Arc<Vec<f32>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Hit/miss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<Vec<f32>>> {
        let found = self.entries.read().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    fn insert(&self, key: CacheKey, vector: Vec<f32>) {
        self.entries.write().insert(key, Arc::new(vector));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

/// Wraps an embedder with a (possibly shared) cache
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>) -> Self {
        Self::with_cache(inner, Arc::new(EmbeddingCache::new()))
    }

    pub fn with_cache(inner: Arc<dyn Embedder>, cache: Arc<EmbeddingCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    fn cached(
        &self,
        role: Role,
        text: &str,
        compute: impl FnOnce(&dyn Embedder) -> Result<Vec<f32>>,
    ) -> Result<Vec<f32>> {
        let key = CacheKey::new(self.inner.model_id(), role, text);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.as_ref().clone());
        }
        let vector = compute(self.inner.as_ref())?;
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // Plain embed() has no prefix, which matches the passage role for every
        // symmetric model; asymmetric models go through embed_passage instead
        self.inner.embed(text)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.cached(Role::Query, text, |inner| inner.embed_query(text))
    }

    fn embed_passage(&self, text: &str) -> Result<Vec<f32>> {
        self.cached(Role::Passage, text, |inner| inner.embed_passage(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Look up every text, then send only the misses in one batch
        let keys: Vec<CacheKey> = texts
            .iter()
            .map(|t| CacheKey::new(self.inner.model_id(), Role::Passage, t))
            .collect();
        let mut out: Vec<Option<Vec<f32>>> = keys
            .iter()
            .map(|k| self.cache.get(k).map(|v| v.as_ref().clone()))
            .collect();

        let missing: Vec<usize> = (0..texts.len()).filter(|&i| out[i].is_none()).collect();
        if !missing.is_empty() {
            let batch: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.inner.embed_batch(&batch)?;
            if vectors.len() != missing.len() {
                return Err(PipelineError::embedding(format!(
                    "batch returned {} vectors for {} texts",
                    vectors.len(),
                    missing.len()
                )));
            }
            for (&i, vector) in missing.iter().zip(vectors) {
                self.cache.insert(keys[i].clone(), vector.clone());
                out[i] = Some(vector);
            }
        }

        Ok(out.into_iter().flatten().collect())
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
