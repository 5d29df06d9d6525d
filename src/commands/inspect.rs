//! Inspect command - persisted index metadata

use super::ConfigSource;
use anyhow::{Context, Result};
use colored::*;
use fitplan::index::IndexStore;

pub fn execute(source: &ConfigSource, json_output: bool) -> Result<()> {
    let config = source.load()?;
    let path = config.index.path();
    let store = IndexStore::new(&path);
    if !store.exists() {
        anyhow::bail!(
            "No index found at {}\n\nRun `fitplan build` first.",
            path.display()
        );
    }
    let meta = store
        .read_meta()
        .with_context(|| format!("Failed to read index metadata from {}", path.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&meta)?);
        return Ok(());
    }

    println!("{}", format!("Index {}", path.display()).bright_cyan());
    let rows = [
        ("model", format!("{} ({}d)", meta.model_id, meta.dimension)),
        ("kind", meta.index_kind.clone()),
        ("entries", meta.entry_count.to_string()),
        (
            "chunking",
            format!("{} {} / {} overlap", meta.chunk_size, meta.chunk_unit, meta.chunk_overlap),
        ),
        ("document", meta.document_source.clone()),
        ("document id", meta.document_id.chars().take(16).collect()),
        ("built", meta.built_at.to_rfc3339()),
    ];
    for (label, value) in rows {
        println!("  {:<12} {}", format!("{}:", label).bright_black(), value);
    }

    let configured = config.embeddings.model_id()?;
    if configured != meta.model_id {
        println!(
            "\n{} configured model is {}; rebuild with `fitplan build --force`",
            "⚠".yellow(),
            configured
        );
    }
    Ok(())
}
