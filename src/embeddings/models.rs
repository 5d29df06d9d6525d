//! Supported embedding models
//!
//! Models are an enumerated set validated at startup rather than free-form
//! names resolved at runtime. The model id is what gets persisted with an
//! index and compared on load.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Query/passage role, for asymmetric models and cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Query,
    Passage,
}

impl Role {
    pub fn tag(&self) -> &'static str {
        match self {
            Role::Query => "query",
            Role::Passage => "passage",
        }
    }
}

/// Built-in embedding models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// Feature-hashed bag of words. Offline, no model files.
    HashedBow,
    /// sentence-transformers/all-MiniLM-L6-v2 (ONNX)
    AllMiniLmL6V2,
    /// BAAI/bge-small-en-v1.5 (ONNX)
    BgeSmallEnV15,
    /// intfloat/e5-base-v2 (ONNX)
    E5BaseV2,
    /// OpenAI-compatible HTTP endpoint; model name and dimension come from config
    Remote,
}

impl EmbeddingModel {
    pub const ALL: [EmbeddingModel; 5] = [
        EmbeddingModel::HashedBow,
        EmbeddingModel::AllMiniLmL6V2,
        EmbeddingModel::BgeSmallEnV15,
        EmbeddingModel::E5BaseV2,
        EmbeddingModel::Remote,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingModel::HashedBow => "hashed-bow-v1",
            EmbeddingModel::AllMiniLmL6V2 => "all-minilm-l6-v2",
            EmbeddingModel::BgeSmallEnV15 => "bge-small-en-v1-5",
            EmbeddingModel::E5BaseV2 => "e5-base-v2",
            EmbeddingModel::Remote => "remote",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|m| m.id() == value)
    }

    /// Native dimension; `None` when the backend decides (remote)
    pub fn dimension(&self) -> Option<usize> {
        match self {
            EmbeddingModel::HashedBow => Some(384),
            EmbeddingModel::AllMiniLmL6V2 => Some(384),
            EmbeddingModel::BgeSmallEnV15 => Some(384),
            EmbeddingModel::E5BaseV2 => Some(768),
            EmbeddingModel::Remote => None,
        }
    }

    pub fn is_onnx(&self) -> bool {
        matches!(
            self,
            EmbeddingModel::AllMiniLmL6V2 | EmbeddingModel::BgeSmallEnV15 | EmbeddingModel::E5BaseV2
        )
    }

    /// Prefix applied before embedding, per role
    pub fn prefix(&self, role: Role) -> Option<&'static str> {
        match (self, role) {
            (EmbeddingModel::BgeSmallEnV15, Role::Query) => {
                Some("Represent this sentence for searching relevant passages: ")
            }
            (EmbeddingModel::E5BaseV2, Role::Query) => Some("query: "),
            (EmbeddingModel::E5BaseV2, Role::Passage) => Some("passage: "),
            _ => None,
        }
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}
