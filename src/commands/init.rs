//! Write a default config file

use super::ConfigSource;
use anyhow::{bail, Context, Result};
use colored::*;
use fitplan::config::{self, Config};

pub fn execute(source: &ConfigSource, force: bool) -> Result<()> {
    let path = source.config_file()?;
    if path.exists() && !force {
        bail!(
            "Config already exists at {}\n\nUse --force to overwrite it.",
            path.display()
        );
    }

    let mut defaults = Config::default();
    if let Some(document) = &source.document {
        defaults.document.path = Some(document.display().to_string());
    }

    config::save_file(&path, &defaults)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "✓ Wrote".green(), path.display());
    if defaults.document.path.is_none() {
        println!(
            "  {}",
            "Set [document] path, or pass --document, before running `fitplan build`".bright_black()
        );
    }
    Ok(())
}
