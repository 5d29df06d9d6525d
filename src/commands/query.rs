//! Query command - top-k passages from the reference document

use super::ConfigSource;
use anyhow::{Context, Result};
use colored::*;

/// Similarity bands for human output
fn strength(score: f32) -> &'static str {
    if score >= 0.70 {
        "strong"
    } else if score >= 0.40 {
        "medium"
    } else {
        "weak"
    }
}

pub fn execute(source: &ConfigSource, query: &str, limit: Option<usize>, json_output: bool) -> Result<()> {
    let pipeline = source.pipeline()?;
    let result = pipeline
        .query(query, limit)
        .with_context(|| format!("Query failed: {:?}", query))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    let Some(best) = result.top() else {
        println!("{}", "No matching passages.".yellow());
        return Ok(());
    };

    println!(
        "{} {}",
        format!("Results for \"{}\"", query).bright_cyan(),
        format!("(best match {})", strength(best.score)).bright_black()
    );
    for (rank, hit) in result.iter().enumerate() {
        println!(
            "\n{} {} {}",
            format!("[{}]", rank + 1).bold(),
            format!("page {}", hit.chunk.page + 1).bright_black(),
            format!("score {:.3} ({})", hit.score, strength(hit.score)).bright_black()
        );
        println!("{}", hit.chunk.text.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_bands() {
        assert_eq!(strength(0.9), "strong");
        assert_eq!(strength(0.5), "medium");
        assert_eq!(strength(0.1), "weak");
    }
}
