pub mod build;
pub mod init;
pub mod inspect;
pub mod plan;
pub mod query;

use anyhow::{Context, Result};
use fitplan::config::{self, Config};
use fitplan::pipeline::Pipeline;
use std::path::PathBuf;

/// Where configuration comes from, as given on the command line
pub struct ConfigSource {
    pub config: Option<PathBuf>,
    pub document: Option<PathBuf>,
}

impl ConfigSource {
    pub fn config_file(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => {
                let cwd = std::env::current_dir().context("Failed to get current directory")?;
                Ok(config::config_path(&cwd))
            }
        }
    }

    /// Load, apply command-line overrides and validate
    pub fn load(&self) -> Result<Config> {
        let path = self.config_file()?;
        let mut config = config::load_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?;
        if let Some(document) = &self.document {
            config.document.path = Some(document.display().to_string());
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        let config = self.load()?;
        Pipeline::from_config(config).context("Failed to initialize pipeline")
    }
}
