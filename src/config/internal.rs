//! Internal implementation for config module
//!
//! Handles .fitplan/config.toml. Every section is optional and falls back to
//! defaults, so an empty file (or no file) is a valid configuration.

use crate::chunking::{ChunkUnit, Chunker};
use crate::embeddings::EmbeddingModel;
use crate::error::{PipelineError, Result};
use crate::index::{HnswParams, IndexKind};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Config Types
// =============================================================================

/// Pipeline configuration stored in .fitplan/config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub document: DocumentSection,
    #[serde(default)]
    pub chunking: ChunkingSection,
    #[serde(default)]
    pub embeddings: EmbeddingsSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub generation: GenerationSection,
    #[serde(default)]
    pub retry: RetrySection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSection {
    /// Reference document (PDF or text)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingSection {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
    #[serde(default)]
    pub unit: ChunkUnit,
}

fn default_chunk_size() -> usize {
    200
}
fn default_chunk_overlap() -> usize {
    40
}

impl Default for ChunkingSection {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
            unit: ChunkUnit::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsSection {
    /// One of the built-in model ids (see `EmbeddingModel`)
    #[serde(default = "default_model")]
    pub model: String,
    /// Model name sent to a remote endpoint (model = "remote")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_model: Option<String>,
    /// Vector dimension of the remote model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,
    /// API root for remote embeddings, e.g. http://localhost:11434/v1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_embed_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Directory holding `<model-id>/model.onnx` + `tokenizer.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models_dir: Option<String>,
}

fn default_model() -> String {
    EmbeddingModel::HashedBow.id().to_string()
}
fn default_embed_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl Default for EmbeddingsSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            remote_model: None,
            dimension: None,
            endpoint: None,
            api_key_env: None,
            timeout_secs: default_embed_timeout(),
            cache: true,
            models_dir: None,
        }
    }
}

impl EmbeddingsSection {
    pub fn embedding_model(&self) -> Result<EmbeddingModel> {
        EmbeddingModel::parse(&self.model).ok_or_else(|| {
            let known: Vec<&str> = EmbeddingModel::ALL.iter().map(|m| m.id()).collect();
            PipelineError::InvalidConfig(format!(
                "unknown embeddings.model '{}' (supported: {})",
                self.model,
                known.join(", ")
            ))
        })
    }

    /// Id an index built with this configuration is stored under
    pub fn model_id(&self) -> Result<String> {
        Ok(match self.embedding_model()? {
            EmbeddingModel::Remote => self.remote_model.clone().unwrap_or_default(),
            model => model.id().to_string(),
        })
    }

    /// Models directory, defaulting to the user cache dir
    pub fn models_dir(&self) -> PathBuf {
        match &self.models_dir {
            Some(dir) => expand_path(dir),
            None => dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".fitplan"))
                .join("fitplan")
                .join("models"),
        }
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }

    fn validate(&self) -> Result<()> {
        let model = self.embedding_model()?;
        if self.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "embeddings.timeout_secs must be positive".into(),
            ));
        }
        if model == EmbeddingModel::Remote {
            if self.endpoint.is_none() {
                return Err(PipelineError::InvalidConfig(
                    "embeddings.endpoint is required when model = \"remote\"".into(),
                ));
            }
            if self.remote_model.as_deref().map_or(true, |m| m.trim().is_empty()) {
                return Err(PipelineError::InvalidConfig(
                    "embeddings.remote_model is required when model = \"remote\"".into(),
                ));
            }
            if self.dimension.unwrap_or(0) == 0 {
                return Err(PipelineError::InvalidConfig(
                    "embeddings.dimension must be set for remote models".into(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalSection {
    /// Default number of passages per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Drop results scoring below this similarity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
}

fn default_top_k() -> usize {
    3
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: None,
        }
    }
}

/// Index variant name as written in config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKindName {
    /// Exact brute-force search
    #[default]
    Flat,
    /// Approximate HNSW search (may miss true neighbours)
    Hnsw,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSection {
    #[serde(default = "default_index_path")]
    pub path: String,
    #[serde(default)]
    pub kind: IndexKindName,
    /// HNSW graph degree
    #[serde(default = "default_connectivity")]
    pub connectivity: usize,
    /// HNSW candidate list size while building
    #[serde(default = "default_expansion_add")]
    pub expansion_add: usize,
    /// HNSW candidate list size while searching (higher = better recall, slower)
    #[serde(default = "default_expansion_search")]
    pub expansion_search: usize,
}

fn default_index_path() -> String {
    ".fitplan/index.db".to_string()
}
fn default_connectivity() -> usize {
    16
}
fn default_expansion_add() -> usize {
    128
}
fn default_expansion_search() -> usize {
    64
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            kind: IndexKindName::default(),
            connectivity: default_connectivity(),
            expansion_add: default_expansion_add(),
            expansion_search: default_expansion_search(),
        }
    }
}

impl IndexSection {
    pub fn index_kind(&self) -> IndexKind {
        match self.kind {
            IndexKindName::Flat => IndexKind::Flat,
            IndexKindName::Hnsw => IndexKind::Hnsw(HnswParams {
                connectivity: self.connectivity,
                expansion_add: self.expansion_add,
                expansion_search: self.expansion_search,
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        expand_path(&self.path)
    }
}

/// Generation backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationBackend {
    /// Offline template-based plan
    #[default]
    Template,
    /// OpenAI-compatible chat completions endpoint
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSection {
    #[serde(default)]
    pub backend: GenerationBackend,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

fn default_generation_timeout() -> u64 {
    120
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            backend: GenerationBackend::default(),
            endpoint: None,
            model: None,
            api_key_env: None,
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(PipelineError::InvalidConfig(
                "generation.timeout_secs must be positive".into(),
            ));
        }
        if self.backend == GenerationBackend::Http
            && (self.endpoint.is_none() || self.model.is_none())
        {
            return Err(PipelineError::InvalidConfig(
                "generation.endpoint and generation.model are required for the http backend".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    250
}
fn default_max_delay_ms() -> u64 {
    4_000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl Config {
    /// Validate everything once at startup
    pub fn validate(&self) -> Result<()> {
        self.chunker()?;
        self.embeddings.validate()?;
        self.generation.validate()?;

        if self.retrieval.top_k == 0 {
            return Err(PipelineError::InvalidConfig(
                "retrieval.top_k must be at least 1".into(),
            ));
        }
        if let Some(min) = self.retrieval.min_score {
            if !(-1.0..=1.0).contains(&min) {
                return Err(PipelineError::InvalidConfig(format!(
                    "retrieval.min_score must be within [-1, 1], got {}",
                    min
                )));
            }
        }
        if self.index.kind == IndexKindName::Hnsw
            && (self.index.connectivity < 2 || self.index.expansion_search == 0)
        {
            return Err(PipelineError::InvalidConfig(
                "index.connectivity must be >= 2 and index.expansion_search > 0".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(PipelineError::InvalidConfig(
                "retry.max_attempts must be at least 1".into(),
            ));
        }
        if self.index.path.trim().is_empty() {
            return Err(PipelineError::InvalidConfig("index.path is empty".into()));
        }
        Ok(())
    }

    pub fn chunker(&self) -> Result<Chunker> {
        Chunker::new(self.chunking.size, self.chunking.overlap, self.chunking.unit)
    }

    pub fn document_path(&self) -> Option<PathBuf> {
        self.document.path.as_deref().map(expand_path)
    }
}

// =============================================================================
// Path Functions
// =============================================================================

/// Expand `~` and environment variables; falls back to the raw string
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(raw),
    }
}

/// Get the .fitplan directory for a project
pub fn fitplan_dir(project_path: &Path) -> PathBuf {
    project_path.join(".fitplan")
}

/// Get the config file path for a project
pub fn config_path(project_path: &Path) -> PathBuf {
    fitplan_dir(project_path).join("config.toml")
}

// =============================================================================
// Load / Save
// =============================================================================

pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        PipelineError::InvalidConfig(format!("failed to parse {}: {}", path.display(), e))
    })
}

pub fn save_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| PipelineError::InvalidConfig(format!("failed to serialize config: {}", e)))?;
    fs::write(path, content)?;
    Ok(())
}
