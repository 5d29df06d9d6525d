//! Internal implementation for document loading

use super::{Document, DocumentFormat, Segment};
use crate::error::{PipelineError, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Joins segments in the concatenated text stream so words never fuse across pages
pub const SEGMENT_SEPARATOR: &str = "\n";

/// Page break emitted by pdf-extract between pages
const FORM_FEED: char = '\u{c}';

/// Stable identifier for document content
pub fn document_id(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn detect_format(path: &Path) -> Result<DocumentFormat> {
    DocumentFormat::from_path(path).ok_or_else(|| PipelineError::UnsupportedFormat {
        path: path.to_path_buf(),
    })
}

fn read_source(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(PipelineError::DocumentNotFound {
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read(path)?)
}

pub(crate) fn load_path(path: &Path) -> Result<Document> {
    load(path, detect_format(path)?)
}

pub(crate) fn fingerprint(path: &Path) -> Result<(DocumentFormat, String)> {
    let format = detect_format(path)?;
    let bytes = read_source(path)?;
    Ok((format, document_id(&bytes)))
}

pub(crate) fn load(path: &Path, format: DocumentFormat) -> Result<Document> {
    let bytes = read_source(path)?;
    let id = document_id(&bytes);

    let raw = match format {
        DocumentFormat::Text => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentFormat::Pdf => extract_pdf(path, &bytes)?,
    };

    let document = match format {
        // Text files are a single page even if they contain form feeds
        DocumentFormat::Text => assemble(id, path.to_path_buf(), format, std::iter::once(raw.as_str()))?,
        DocumentFormat::Pdf => assemble(id, path.to_path_buf(), format, raw.split(FORM_FEED))?,
    };

    info!(
        path = %path.display(),
        segments = document.segments.len(),
        chars = document.char_len(),
        "loaded document"
    );
    Ok(document)
}

fn extract_pdf(path: &Path, bytes: &[u8]) -> Result<String> {
    debug!(path = %path.display(), bytes = bytes.len(), "extracting pdf text");
    // Image-only or encrypted PDFs come back empty; assemble() reports those
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("failed to extract text from {}: {}", path.display(), e),
        ))
    })
}

/// Turn raw pages into segments, skipping blank pages but keeping page numbers
pub(crate) fn assemble<'a>(
    id: String,
    source: PathBuf,
    format: DocumentFormat,
    pages: impl Iterator<Item = &'a str>,
) -> Result<Document> {
    let separator_len = SEGMENT_SEPARATOR.chars().count();
    let mut segments = Vec::new();
    let mut offset = 0usize;

    for (page, raw) in pages.enumerate() {
        let text = normalize_whitespace(raw);
        if text.is_empty() {
            continue;
        }
        if !segments.is_empty() {
            offset += separator_len;
        }
        let len = text.chars().count();
        segments.push(Segment { page, offset, text });
        offset += len;
    }

    if segments.is_empty() {
        return Err(PipelineError::EmptyDocument { path: source });
    }

    Ok(Document {
        id,
        source,
        format,
        segments,
    })
}

/// Collapse runs of blank lines and trailing spaces left behind by extraction
fn normalize_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = 0;
    }
    out.trim().to_string()
}
