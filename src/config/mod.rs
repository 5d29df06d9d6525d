//! Config module - pipeline configuration
//!
//! Manages `.fitplan/config.toml`: document path, chunking, embedding model,
//! retrieval, index storage, generation backend and retry policy. The file is
//! parsed into typed sections and validated once at startup; nothing else in
//! the crate reads configuration from the environment.
//!
//! # Example
//!
//! ```no_run
//! use fitplan::config;
//! use std::path::Path;
//!
//! let config = config::load(Path::new("."))?;
//! config.validate()?;
//! println!("top-k: {}", config.retrieval.top_k);
//! # Ok::<(), fitplan::error::PipelineError>(())
//! ```

mod internal;

use crate::error::Result;
use std::path::Path;

pub use internal::{
    config_path, expand_path, fitplan_dir, ChunkingSection, Config, DocumentSection,
    EmbeddingsSection, GenerationBackend, GenerationSection, IndexKindName, IndexSection,
    RetrievalSection, RetrySection,
};

/// Load project config from `.fitplan/config.toml`
///
/// Returns default config if the file doesn't exist. Does not validate.
pub fn load(project_path: &Path) -> Result<Config> {
    internal::load_from(&config_path(project_path))
}

/// Load config from an explicit file path
pub fn load_file(path: &Path) -> Result<Config> {
    internal::load_from(path)
}

/// Save config to an explicit file path
pub fn save_file(path: &Path, config: &Config) -> Result<()> {
    internal::save_to(path, config)
}

/// Save config to `.fitplan/config.toml`
pub fn save(project_path: &Path, config: &Config) -> Result<()> {
    internal::save_to(&config_path(project_path), config)
}
