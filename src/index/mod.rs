//! Vector index - nearest-neighbour search over chunk embeddings
//!
//! Two variants share the [`VectorIndex`] contract:
//!
//! - [`FlatIndex`]: exact brute force. Scores every entry and returns the
//!   true top-k.
//! - [`HnswIndex`]: approximate search through a USearch HNSW graph. Faster
//!   on large corpora but recall can be below 1: a true neighbour may be
//!   missing from the candidates. Candidates are re-scored exactly, so the
//!   scores themselves are exact. Tune with `index.expansion_search`.
//!
//! Similarity is cosine. Results are sorted by descending score with ties
//! broken by insertion order. An index is immutable once built; rebuilding
//! is the only way to change it.

mod flat;
mod hnsw;
pub mod store;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;
pub use store::{bytes_to_vec_f32, vec_f32_to_bytes, IndexMeta, IndexStore, PersistedIndex};

use crate::chunking::Chunk;
use crate::embeddings::cosine_similarity;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

/// An embedded chunk, owned by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// A chunk with its similarity to the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// HNSW tuning knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnswParams {
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexKind {
    #[default]
    Flat,
    Hnsw(HnswParams),
}

impl IndexKind {
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::Flat => "flat",
            IndexKind::Hnsw(_) => "hnsw",
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, IndexKind::Flat)
    }
}

/// Searchable, immutable collection of index entries
pub trait VectorIndex: Send + Sync {
    /// Up to `k` entries most similar to `query`, best first
    ///
    /// Empty index or `k == 0` gives an empty result. A query whose length
    /// differs from [`dimension`](Self::dimension) is a `DimensionMismatch`.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>>;

    /// Entries in insertion order
    fn entries(&self) -> &[IndexEntry];

    fn dimension(&self) -> usize;

    fn kind(&self) -> IndexKind;

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

/// Build the configured index variant from scratch
pub fn build_index(
    kind: IndexKind,
    dimension: usize,
    entries: Vec<IndexEntry>,
) -> Result<Arc<dyn VectorIndex>> {
    Ok(match kind {
        IndexKind::Flat => Arc::new(FlatIndex::build(dimension, entries)?),
        IndexKind::Hnsw(params) => Arc::new(HnswIndex::build(dimension, entries, params)?),
    })
}

/// Every entry must have the index dimension
fn check_entries(dimension: usize, entries: &[IndexEntry]) -> Result<()> {
    if dimension == 0 {
        return Err(PipelineError::InvalidConfig(
            "index dimension must be positive".into(),
        ));
    }
    match entries.iter().find(|e| e.vector.len() != dimension) {
        Some(bad) => Err(PipelineError::DimensionMismatch {
            expected: dimension,
            actual: bad.vector.len(),
        }),
        None => Ok(()),
    }
}

fn check_query(dimension: usize, query: &[f32]) -> Result<()> {
    if query.len() != dimension {
        return Err(PipelineError::DimensionMismatch {
            expected: dimension,
            actual: query.len(),
        });
    }
    Ok(())
}

/// Score `candidates` exactly and keep the best `k`
///
/// Order: score descending, then position ascending. NaN scores sort last.
fn rank(
    entries: &[IndexEntry],
    query: &[f32],
    candidates: impl Iterator<Item = usize>,
    k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<(usize, f32)> = candidates
        .filter(|&pos| pos < entries.len())
        .map(|pos| {
            let score = cosine_similarity(query, &entries[pos].vector);
            (pos, if score.is_nan() { f32::NEG_INFINITY } else { score })
        })
        .collect();

    scored.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    scored.dedup_by_key(|(pos, _)| *pos);
    scored.truncate(k);

    scored
        .into_iter()
        .map(|(pos, score)| ScoredChunk {
            chunk: entries[pos].chunk.clone(),
            score,
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_rank_breaks_ties_by_position() {
        let entries = vec![
            entry(0, vec![0.0, 1.0]),
            entry(1, vec![1.0, 0.0]),
            entry(2, vec![1.0, 0.0]),
            entry(3, vec![2.0, 0.0]),
        ];
        let ranked = rank(&entries, &[1.0, 0.0], 0..entries.len(), 4);
        let order: Vec<usize> = ranked.iter().map(|r| r.chunk.index).collect();
        assert_eq!(order, vec![1, 2, 3, 0]);
    }

    #[test]
    fn test_rank_sorts_nan_last() {
        let entries = vec![entry(0, vec![f32::NAN, 0.0]), entry(1, vec![0.5, 0.5])];
        let ranked = rank(&entries, &[1.0, 0.0], 0..2, 2);
        assert_eq!(ranked[0].chunk.index, 1);
    }

    #[test]
    fn test_check_entries_reports_mismatch() {
        let entries = vec![entry(0, vec![1.0, 0.0]), entry(1, vec![1.0, 0.0, 0.0])];
        assert!(matches!(
            check_entries(2, &entries),
            Err(PipelineError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_build_index_dispatches_kind() {
        let entries = random_entries(10, 8, 7);
        let flat = build_index(IndexKind::Flat, 8, entries.clone()).unwrap();
        let hnsw = build_index(IndexKind::Hnsw(HnswParams::default()), 8, entries).unwrap();
        assert_eq!(flat.kind().name(), "flat");
        assert_eq!(hnsw.kind().name(), "hnsw");
        assert!(flat.kind().is_exact());
        assert!(!hnsw.kind().is_exact());
        assert_eq!(flat.len(), hnsw.len());
    }
}
