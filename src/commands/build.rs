//! Build or refresh the index for the reference document

use super::ConfigSource;
use anyhow::{Context, Result};
use colored::*;
use fitplan::retrieval::IndexStatus;
use serde_json::json;

pub fn execute(source: &ConfigSource, force: bool, json_output: bool) -> Result<()> {
    let pipeline = source.pipeline()?;
    let (snapshot, status) = pipeline.build(force).context("Failed to build index")?;
    let status_name = match status {
        IndexStatus::Reused => "reused",
        IndexStatus::Rebuilt => "rebuilt",
    };

    if json_output {
        let output = json!({
            "status": status_name,
            "index_path": pipeline.index_path().display().to_string(),
            "meta": snapshot.meta,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let meta = &snapshot.meta;
    let kind = snapshot.index.kind();
    let headline = match status {
        IndexStatus::Reused => "✓ Index is current".green(),
        IndexStatus::Rebuilt => "✓ Index rebuilt".green(),
    };
    println!(
        "{} {} chunks from {}",
        headline, meta.entry_count, meta.document_source
    );
    println!(
        "  {} {} ({}d), {} index ({})",
        "model:".bright_black(),
        meta.model_id,
        meta.dimension,
        kind.name(),
        if kind.is_exact() { "exact" } else { "approximate" }
    );
    println!(
        "  {} {}",
        "stored:".bright_black(),
        pipeline.index_path().display()
    );
    Ok(())
}
