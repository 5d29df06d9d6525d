//! Error taxonomy for the retrieval pipeline
//!
//! Library code returns [`PipelineError`]; the binary wraps it in `anyhow`
//! with context about what the operator was trying to do.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias used throughout the library
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported document format: {path} (expected .pdf, .txt, .text or .md)")]
    UnsupportedFormat { path: PathBuf },

    #[error("document not found: {path}")]
    DocumentNotFound { path: PathBuf },

    #[error("document has no extractable text: {path}")]
    EmptyDocument { path: PathBuf },

    #[error("invalid chunk parameters: size={size}, overlap={overlap} (need size > 0 and overlap < size)")]
    InvalidChunkParams { size: usize, overlap: usize },

    /// Backend failure while embedding. `transient` marks failures worth retrying
    /// (timeouts, connection resets, 429/5xx).
    #[error("embedding service error: {message}")]
    EmbeddingService { message: String, transient: bool },

    #[error("generation service error: {message}")]
    GenerationService { message: String, transient: bool },

    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("persisted index was built with model '{stored}' but '{configured}' is configured; rebuild the index")]
    IndexModelMismatch { stored: String, configured: String },

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("nothing to ground generation on: no retrieved passages and no derived facts")]
    EmptyContext,

    #[error("invalid user profile: {0}")]
    InvalidProfile(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("query cancelled by caller")]
    Cancelled,

    #[error("index storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn embedding(message: impl Into<String>) -> Self {
        PipelineError::EmbeddingService {
            message: message.into(),
            transient: false,
        }
    }

    pub fn embedding_transient(message: impl Into<String>) -> Self {
        PipelineError::EmbeddingService {
            message: message.into(),
            transient: true,
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        PipelineError::GenerationService {
            message: message.into(),
            transient: false,
        }
    }

    pub fn generation_transient(message: impl Into<String>) -> Self {
        PipelineError::GenerationService {
            message: message.into(),
            transient: true,
        }
    }

    /// Whether a call site should retry the operation that produced this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::EmbeddingService {
                transient: true,
                ..
            } | PipelineError::GenerationService {
                transient: true,
                ..
            }
        )
    }

    /// Configuration errors must be fixed by the operator, never auto-corrected
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidChunkParams { .. }
                | PipelineError::DimensionMismatch { .. }
                | PipelineError::IndexModelMismatch { .. }
                | PipelineError::InvalidConfig(_)
                | PipelineError::UnsupportedFormat { .. }
        )
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Storage(err.to_string())
    }
}
