//! Chunking - fixed-size sliding windows over a document
//!
//! A window of `size` units slides over the concatenated text of all
//! segments with stride `size - overlap`. Size, overlap and offsets all use
//! the same [`ChunkUnit`]. Chunk text is sliced from the concatenated text, so
//! original spacing and punctuation survive. The last chunk may be shorter
//! than `size`.

use crate::document::{Document, SEGMENT_SEPARATOR};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};

/// Unit used to measure chunk size, overlap and offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values
    Chars,
    /// Whitespace-separated words
    Words,
    /// Alphanumeric runs, with every other non-space char as its own token
    #[default]
    Tokens,
}

impl ChunkUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkUnit::Chars => "chars",
            ChunkUnit::Words => "words",
            ChunkUnit::Tokens => "tokens",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "chars" => Some(ChunkUnit::Chars),
            "words" => Some(ChunkUnit::Words),
            "tokens" => Some(ChunkUnit::Tokens),
            _ => None,
        }
    }

    /// Byte spans of each unit in `text`
    fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        match self {
            ChunkUnit::Chars => text
                .char_indices()
                .map(|(at, c)| (at, at + c.len_utf8()))
                .collect(),
            ChunkUnit::Words => word_spans(text, |c| !c.is_whitespace(), |_| false),
            ChunkUnit::Tokens => word_spans(text, |c| c.is_alphanumeric(), |c| {
                !c.is_whitespace() && !c.is_alphanumeric()
            }),
        }
    }
}

/// Runs of `in_run` chars become one span; `single` chars are spans of their own
fn word_spans(
    text: &str,
    in_run: impl Fn(char) -> bool,
    single: impl Fn(char) -> bool,
) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut run_start: Option<usize> = None;

    for (at, c) in text.char_indices() {
        if in_run(c) {
            run_start.get_or_insert(at);
            continue;
        }
        if let Some(start) = run_start.take() {
            spans.push((start, at));
        }
        if single(c) {
            spans.push((at, at + c.len_utf8()));
        }
    }
    if let Some(start) = run_start {
        spans.push((start, text.len()));
    }
    spans
}

/// A bounded span of source text, the retrieval unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    /// Position in the chunk sequence
    pub index: usize,
    /// Index of the first unit (inclusive) in the joined segment stream
    pub start: usize,
    /// Index one past the last unit in the joined segment stream
    pub end: usize,
    /// Page containing the first unit of the chunk
    pub page: usize,
    pub text: String,
}

impl Chunk {
    pub fn id(&self) -> String {
        format!("{}#{}", self.document_id, self.index)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Validated chunking parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
}

impl Chunker {
    /// Fails with `InvalidChunkParams` unless `size > 0` and `overlap < size`
    pub fn new(size: usize, overlap: usize, unit: ChunkUnit) -> Result<Self> {
        if size == 0 || overlap >= size {
            return Err(PipelineError::InvalidChunkParams { size, overlap });
        }
        Ok(Self {
            size,
            overlap,
            unit,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    pub fn unit(&self) -> ChunkUnit {
        self.unit
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }

    /// Split a document into ordered, overlapping chunks
    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let (text, page_starts) = concatenate(document);
        let spans = self.unit.spans(&text);
        let total = spans.len();
        let mut chunks = Vec::new();
        if total == 0 {
            return chunks;
        }

        let mut start = 0;
        loop {
            let end = (start + self.size).min(total);
            let (byte_start, _) = spans[start];
            let (_, byte_end) = spans[end - 1];
            chunks.push(Chunk {
                document_id: document.id.clone(),
                index: chunks.len(),
                start,
                end,
                page: page_at(&page_starts, byte_start),
                text: text[byte_start..byte_end].to_string(),
            });
            if end == total {
                break;
            }
            start += self.stride();
        }

        chunks
    }
}

/// Joined text plus (byte offset, page) for each segment
fn concatenate(document: &Document) -> (String, Vec<(usize, usize)>) {
    let mut text = String::new();
    let mut page_starts = Vec::with_capacity(document.segments.len());
    for (i, segment) in document.segments.iter().enumerate() {
        if i > 0 {
            text.push_str(SEGMENT_SEPARATOR);
        }
        page_starts.push((text.len(), segment.page));
        text.push_str(&segment.text);
    }
    (text, page_starts)
}

fn page_at(page_starts: &[(usize, usize)], byte: usize) -> usize {
    let idx = page_starts.partition_point(|(start, _)| *start <= byte);
    page_starts
        .get(idx.saturating_sub(1))
        .map(|(_, page)| *page)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: &[&str]) -> Document {
        Document::from_pages("guide.txt", pages).unwrap()
    }

    #[test]
    fn test_rejects_invalid_params() {
        assert!(matches!(
            Chunker::new(0, 0, ChunkUnit::Chars),
            Err(PipelineError::InvalidChunkParams { size: 0, overlap: 0 })
        ));
        assert!(Chunker::new(10, 10, ChunkUnit::Words).is_err());
        assert!(Chunker::new(10, 11, ChunkUnit::Words).is_err());
        assert!(Chunker::new(10, 9, ChunkUnit::Words).is_ok());
    }

    #[test]
    fn test_short_text_yields_one_chunk() {
        let chunker = Chunker::new(50, 5, ChunkUnit::Words).unwrap();
        let chunks = chunker.chunk(&doc(&["Squats build leg strength."]));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Squats build leg strength.");
        assert_eq!((chunks[0].start, chunks[0].end), (0, 4));
    }

    #[test]
    fn test_tokens_split_punctuation() {
        let spans = ChunkUnit::Tokens.spans("Rest 90s, then repeat.");
        let text = "Rest 90s, then repeat.";
        let tokens: Vec<&str> = spans.iter().map(|(s, e)| &text[*s..*e]).collect();
        assert_eq!(tokens, vec!["Rest", "90s", ",", "then", "repeat", "."]);
    }

    #[test]
    fn test_char_windows_cover_text_with_exact_overlap() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let chunker = Chunker::new(8, 3, ChunkUnit::Chars).unwrap();
        let chunks = chunker.chunk(&doc(&[text]));

        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, text.len());
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].end - pair[1].start, 3);
            assert_eq!(&pair[0].text[5..], &pair[1].text[..3]);
        }
        for chunk in &chunks {
            assert!(chunk.len() <= 8);
            assert_eq!(chunk.text, &text[chunk.start..chunk.end]);
        }
    }

    #[test]
    fn test_windows_cover_every_unit_for_all_units() {
        let document = doc(&[
            "Squats, lunges and step-ups build the legs. Rest 90s between sets.",
            "Bench press (3x8) and rows balance the upper body!",
        ]);
        let text = document.full_text();

        for unit in [ChunkUnit::Chars, ChunkUnit::Words, ChunkUnit::Tokens] {
            let spans = unit.spans(&text);
            let total = spans.len();
            if unit == ChunkUnit::Chars {
                assert_eq!(total, document.char_len());
            }

            for (size, overlap) in [(5, 2), (4, 0), (7, 6), (1, 0), (total, 3), (total + 10, 0)] {
                let chunks = Chunker::new(size, overlap, unit).unwrap().chunk(&document);
                let label = format!("{:?} size={} overlap={}", unit, size, overlap);

                if size >= total {
                    assert_eq!(chunks.len(), 1, "{}", label);
                }
                assert_eq!(chunks[0].start, 0, "{}", label);
                assert_eq!(chunks.last().unwrap().end, total, "{}", label);

                for chunk in &chunks {
                    assert!(chunk.len() <= size && !chunk.is_empty(), "{}", label);
                    let (byte_start, _) = spans[chunk.start];
                    let (_, byte_end) = spans[chunk.end - 1];
                    assert_eq!(chunk.text, &text[byte_start..byte_end], "{}", label);
                }
                for pair in chunks.windows(2) {
                    // full windows only, so each neighbour shares exactly `overlap` units
                    assert_eq!(pair[0].len(), size, "{}", label);
                    assert_eq!(pair[0].end - pair[1].start, overlap, "{}", label);
                }
            }
        }
    }

    #[test]
    fn test_multibyte_chars_counted_as_units() {
        let chunker = Chunker::new(4, 1, ChunkUnit::Chars).unwrap();
        let chunks = chunker.chunk(&doc(&["séries de força"]));
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 4));
        assert_eq!(chunks[0].text, "séri");
        assert_eq!(chunks[1].text, "ies ");
    }

    #[test]
    fn test_pages_recorded_for_chunk_start() {
        let chunker = Chunker::new(3, 1, ChunkUnit::Words).unwrap();
        let chunks = chunker.chunk(&doc(&["one two three four", "", "five six seven"]));

        // words: one two three four | five six seven
        let starts: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start, c.page)).collect();
        assert_eq!(starts, vec![(0, 0), (2, 0), (4, 2)]);
        assert_eq!(chunks[1].text, "three four\nfive");
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let document = doc(&["Bench press builds chest strength. Rows build the back."]);
        let chunker = Chunker::new(4, 1, ChunkUnit::Tokens).unwrap();
        assert_eq!(chunker.chunk(&document), chunker.chunk(&document));
    }

    #[test]
    fn test_chunk_ids_are_sequential() {
        let document = doc(&["a b c d e f g h"]);
        let chunks = Chunker::new(3, 0, ChunkUnit::Words).unwrap().chunk(&document);
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(chunks[2].text, "g h");
        assert!(chunks[0].id().ends_with("#0"));
    }
}
