//! Exact brute-force index

use super::{check_entries, check_query, rank, IndexEntry, IndexKind, ScoredChunk, VectorIndex};
use crate::error::Result;

pub struct FlatIndex {
    dimension: usize,
    entries: Vec<IndexEntry>,
}

impl FlatIndex {
    pub fn build(dimension: usize, entries: Vec<IndexEntry>) -> Result<Self> {
        check_entries(dimension, &entries)?;
        Ok(Self { dimension, entries })
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        check_query(self.dimension, query)?;
        Ok(rank(&self.entries, query, 0..self.entries.len(), k))
    }

    fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn kind(&self) -> IndexKind {
        IndexKind::Flat
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::embeddings::cosine_similarity;
    use crate::error::PipelineError;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_index_returns_empty_result() {
        let index = FlatIndex::build(4, Vec::new()).unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0, 0.0], 3).unwrap().is_empty());
        assert!(index.is_empty());
    }

    #[test]
    fn test_fewer_entries_than_k_returns_all() {
        let index = FlatIndex::build(8, random_entries(2, 8, 1)).unwrap();
        let results = index.search(&random_entries(1, 8, 99)[0].vector, 5).unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_zero_k_returns_empty() {
        let index = FlatIndex::build(8, random_entries(3, 8, 1)).unwrap();
        assert!(index.search(&[0.0; 8], 0).unwrap().is_empty());
    }

    #[test]
    fn test_identical_vector_ranks_first() {
        let entries = random_entries(50, 16, 3);
        let target = entries[17].vector.clone();
        let index = FlatIndex::build(16, entries).unwrap();

        let results = index.search(&target, 5).unwrap();
        assert_eq!(results[0].chunk.index, 17);
        assert_relative_eq!(results[0].score, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_results_non_increasing() {
        let index = FlatIndex::build(16, random_entries(100, 16, 5)).unwrap();
        let query = random_entries(1, 16, 42)[0].vector.clone();
        let results = index.search(&query, 20).unwrap();

        assert_eq!(results.len(), 20);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_matches_full_scan() {
        let entries = random_entries(60, 12, 11);
        let query = random_entries(1, 12, 77)[0].vector.clone();

        let mut expected: Vec<(usize, f32)> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(&query, &e.vector)))
            .collect();
        expected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let index = FlatIndex::build(12, entries).unwrap();
        let got: Vec<usize> = index
            .search(&query, 10)
            .unwrap()
            .iter()
            .map(|r| r.chunk.index)
            .collect();
        let want: Vec<usize> = expected.iter().take(10).map(|(i, _)| *i).collect();
        assert_eq!(got, want);
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = FlatIndex::build(8, random_entries(3, 8, 1)).unwrap();
        let err = index.search(&[1.0, 0.0], 1).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch { expected: 8, actual: 2 }
        ));
    }

    #[test]
    fn test_inconsistent_entries_rejected() {
        let mut entries = random_entries(3, 8, 1);
        entries[1].vector.pop();
        assert!(FlatIndex::build(8, entries).is_err());
    }
}
