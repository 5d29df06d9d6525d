//! Approximate index over a USearch HNSW graph
//!
//! Graph keys are entry positions. USearch supplies candidates; the final
//! ordering and scores come from exact cosine over the stored vectors.

use super::{
    check_entries, check_query, rank, HnswParams, IndexEntry, IndexKind, ScoredChunk, VectorIndex,
};
use crate::error::{PipelineError, Result};
use tracing::debug;
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

pub struct HnswIndex {
    dimension: usize,
    params: HnswParams,
    entries: Vec<IndexEntry>,
    // None when there are no entries
    graph: Option<Index>,
}

fn usearch_err(what: &str, err: impl std::fmt::Display) -> PipelineError {
    PipelineError::Storage(format!("usearch {}: {}", what, err))
}

impl HnswIndex {
    pub fn build(dimension: usize, entries: Vec<IndexEntry>, params: HnswParams) -> Result<Self> {
        check_entries(dimension, &entries)?;

        let graph = if entries.is_empty() {
            None
        } else {
            let options = IndexOptions {
                dimensions: dimension,
                metric: MetricKind::Cos,
                quantization: ScalarKind::F32,
                connectivity: params.connectivity,
                expansion_add: params.expansion_add,
                expansion_search: params.expansion_search,
                ..Default::default()
            };
            let graph = Index::new(&options).map_err(|e| usearch_err("create", e))?;
            graph
                .reserve(entries.len())
                .map_err(|e| usearch_err("reserve", e))?;
            for (position, entry) in entries.iter().enumerate() {
                graph
                    .add(position as u64, &entry.vector)
                    .map_err(|e| usearch_err("add", e))?;
            }
            debug!(entries = entries.len(), dimension, "hnsw graph built");
            Some(graph)
        };

        Ok(Self {
            dimension,
            params,
            entries,
            graph,
        })
    }

    /// Candidate pool size for a request of `k`
    fn pool(&self, k: usize) -> usize {
        k.max(self.params.expansion_search).min(self.entries.len())
    }
}

impl VectorIndex for HnswIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        let graph = match &self.graph {
            Some(graph) if k > 0 => graph,
            _ => return Ok(Vec::new()),
        };
        check_query(self.dimension, query)?;

        let matches = graph
            .search(query, self.pool(k))
            .map_err(|e| usearch_err("search", e))?;

        let candidates = matches.keys.into_iter().map(|key| key as usize);
        Ok(rank(&self.entries, query, candidates, k))
    }

    fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Hnsw(self.params)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::FlatIndex;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_graph_returns_empty() {
        let index = HnswIndex::build(8, Vec::new(), HnswParams::default()).unwrap();
        assert!(index.search(&[0.5; 8], 3).unwrap().is_empty());
    }

    #[test]
    fn test_finds_exact_match() {
        let entries = random_entries(200, 32, 9);
        let target = entries[123].vector.clone();
        let index = HnswIndex::build(32, entries, HnswParams::default()).unwrap();

        let results = index.search(&target, 3).unwrap();
        assert_eq!(results[0].chunk.index, 123);
        assert_relative_eq!(results[0].score, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_scores_are_exact_and_sorted() {
        let entries = random_entries(100, 16, 4);
        let query = random_entries(1, 16, 1234)[0].vector.clone();
        let index = HnswIndex::build(16, entries.clone(), HnswParams::default()).unwrap();

        let results = index.search(&query, 10).unwrap();
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for result in &results {
            let exact = crate::embeddings::cosine_similarity(
                &query,
                &entries[result.chunk.index].vector,
            );
            assert_relative_eq!(result.score, exact, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_small_corpus_agrees_with_flat() {
        // pool covers the whole corpus, so the result is exact
        let entries = random_entries(40, 16, 21);
        let query = random_entries(1, 16, 5)[0].vector.clone();

        let flat = FlatIndex::build(16, entries.clone()).unwrap();
        let hnsw = HnswIndex::build(16, entries, HnswParams::default()).unwrap();

        let flat_ids: Vec<usize> = flat.search(&query, 5).unwrap().iter().map(|r| r.chunk.index).collect();
        let hnsw_ids: Vec<usize> = hnsw.search(&query, 5).unwrap().iter().map(|r| r.chunk.index).collect();
        assert_eq!(flat_ids, hnsw_ids);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = HnswIndex::build(8, random_entries(5, 8, 2), HnswParams::default()).unwrap();
        assert!(index.search(&[1.0; 4], 2).is_err());
    }
}
