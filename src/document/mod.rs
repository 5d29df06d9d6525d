//! Document module - load reference documents into page segments
//!
//! Supports PDF (via `pdf-extract`) and plain text. A document is identified
//! by the SHA-256 of its bytes, so an unchanged file always maps to the same
//! id and a changed file invalidates any index built from it.
//!
//! # Example
//!
//! ```no_run
//! use fitplan::document;
//! use std::path::Path;
//!
//! let doc = document::load_path(Path::new("guides/strength.pdf"))?;
//! println!("{} pages from {}", doc.segments.len(), doc.source.display());
//! # Ok::<(), fitplan::error::PipelineError>(())
//! ```

mod internal;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use internal::{document_id, SEGMENT_SEPARATOR};

/// Supported source formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Text,
}

impl DocumentFormat {
    /// Detect format from a file extension (case-insensitive)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "txt" | "text" | "md" => Some(DocumentFormat::Text),
            _ => None,
        }
    }
}

/// One page (or the whole body of a text file)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// 0-based page index in the source
    pub page: usize,
    /// Char offset of this segment in [`Document::full_text`]
    pub offset: usize,
    pub text: String,
}

/// A loaded source document. Immutable; reload when the file changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source: PathBuf,
    pub format: DocumentFormat,
    pub segments: Vec<Segment>,
}

impl Document {
    /// Build a document from in-memory pages (used by tests and callers that
    /// already hold extracted text). Blank pages are skipped, page numbers kept.
    pub fn from_pages(source: impl Into<PathBuf>, pages: &[&str]) -> Result<Self> {
        let source = source.into();
        let joined = pages.join("\u{c}");
        let id = document_id(joined.as_bytes());
        internal::assemble(id, source, DocumentFormat::Text, pages.iter().copied())
    }

    /// Segments joined by [`SEGMENT_SEPARATOR`]
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(SEGMENT_SEPARATOR)
    }

    pub fn char_len(&self) -> usize {
        self.full_text().chars().count()
    }
}

/// Load a document with an explicitly declared format
pub fn load(path: &Path, format: DocumentFormat) -> Result<Document> {
    internal::load(path, format)
}

/// Load a document, detecting the format from its extension
pub fn load_path(path: &Path) -> Result<Document> {
    internal::load_path(path)
}

/// Format and content id of a file without extracting its text
///
/// Same checks and id as [`load_path`]; cheap enough to run on every start
/// to decide whether a persisted index is still current.
pub fn fingerprint(path: &Path) -> Result<(DocumentFormat, String)> {
    internal::fingerprint(path)
}
