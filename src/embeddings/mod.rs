//! Embeddings module - map chunk text to fixed-dimension vectors
//!
//! Provides the [`Embedder`] port plus backends: feature hashing (offline),
//! local ONNX models and OpenAI-compatible HTTP services. Backends are chosen
//! from the enumerated [`EmbeddingModel`] set in configuration.

mod cache;
mod hashed;
pub mod models;
mod onnx;
mod remote;
mod similarity;

pub use cache::{CacheStats, CachedEmbedder, EmbeddingCache};
pub use hashed::HashedEmbedder;
pub use models::{EmbeddingModel, Role};
pub use onnx::{model_files, OnnxEmbedder};
pub use remote::RemoteEmbedder;
pub use similarity::{cosine_similarity, dot_product, l2_normalize, norm};

use crate::config::EmbeddingsSection;
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Embedding backend
///
/// Methods take `&self` so one embedder can serve concurrent requests;
/// backends that need exclusive state lock internally.
pub trait Embedder: Send + Sync {
    /// Generate embedding for a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding for a search query
    ///
    /// Asymmetric models (BGE, E5) apply a query prefix. Defaults to `embed`.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    /// Generate embedding for an indexed passage. Defaults to `embed`.
    fn embed_passage(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text)
    }

    /// Embed many passages. Must return the same vectors as calling
    /// `embed_passage` on each text.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_passage(t)).collect()
    }

    /// Embedding dimension (e.g., 384 for all-MiniLM-L6-v2)
    fn dimension(&self) -> usize;

    /// Model identifier persisted with indexes
    fn model_id(&self) -> &str;
}

/// Build the configured embedder, wrapped in a cache unless disabled
pub fn create_embedder(section: &EmbeddingsSection) -> Result<Arc<dyn Embedder>> {
    let model = section.embedding_model()?;
    let timeout = Duration::from_secs(section.timeout_secs);

    let embedder: Arc<dyn Embedder> = match model {
        EmbeddingModel::HashedBow => Arc::new(HashedEmbedder::new()),
        EmbeddingModel::AllMiniLmL6V2 | EmbeddingModel::BgeSmallEnV15 | EmbeddingModel::E5BaseV2 => {
            Arc::new(OnnxEmbedder::from_models_dir(&section.models_dir(), model)?)
        }
        EmbeddingModel::Remote => {
            let endpoint = section.endpoint.as_deref().ok_or_else(|| {
                PipelineError::InvalidConfig("embeddings.endpoint is required for remote models".into())
            })?;
            let remote_model = section.remote_model.as_deref().unwrap_or_default();
            let dimension = section.dimension.unwrap_or_default();
            Arc::new(RemoteEmbedder::new(
                endpoint,
                remote_model,
                dimension,
                section.api_key(),
                timeout,
            )?)
        }
    };

    info!(
        model = embedder.model_id(),
        dimension = embedder.dimension(),
        cache = section.cache,
        "embedder ready"
    );

    if section.cache {
        Ok(Arc::new(CachedEmbedder::new(embedder)))
    } else {
        Ok(embedder)
    }
}
