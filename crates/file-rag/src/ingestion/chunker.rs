//! Recursive text chunking with overlap

use unicode_segmentation::UnicodeSegmentation;

use super::loader::LoadedDocument;

/// Separators tried in order; the empty separator splits into graphemes
const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A chunk of a loaded document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Chunk text
    pub content: String,
    /// File path or URL the text came from
    pub source: String,
    /// Page number for paginated sources
    pub page: Option<u32>,
}

/// Text chunker with configurable size and overlap, both in characters
pub struct TextChunker {
    /// Target chunk size in characters
    chunk_size: usize,
    /// Overlap between chunks
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker; overlap is clamped below the chunk size
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    /// Chunk every document, keeping its source and page
    pub fn chunk_documents(&self, docs: &[LoadedDocument]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for doc in docs {
            for content in self.split_text(&doc.content) {
                chunks.push(Chunk {
                    content,
                    source: doc.source.clone(),
                    page: doc.page,
                });
            }
        }
        chunks
    }

    /// Split text into chunks of at most `chunk_size` characters where possible
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        // The empty separator always matches, so a position is always found
        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep))
            .unwrap_or(separators.len().saturating_sub(1));
        let separator = separators.get(position).copied().unwrap_or("");
        let remaining = separators.get(position + 1..).unwrap_or(&[]);

        let splits: Vec<&str> = if separator.is_empty() {
            text.graphemes(true).collect()
        } else {
            text.split(separator).filter(|s| !s.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<&str> = Vec::new();
        for split in splits {
            if char_len(split) < self.chunk_size {
                good.push(split);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge_splits(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_recursive(split, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge_splits(&good, separator));
        }

        chunks
    }

    /// Greedily join splits up to `chunk_size`, carrying up to `overlap` characters forward
    fn merge_splits(&self, splits: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);
            let joined_sep = if current.is_empty() { 0 } else { sep_len };

            if total + len + joined_sep > self.chunk_size && !current.is_empty() {
                push_joined(&mut chunks, &current, separator);

                while !current.is_empty()
                    && (total > self.overlap || total + len + sep_len > self.chunk_size)
                {
                    let dropped = char_len(current[0]) + if current.len() > 1 { sep_len } else { 0 };
                    total = total.saturating_sub(dropped);
                    current.remove(0);
                }
                if current.is_empty() {
                    total = 0;
                }
            }

            current.push(split);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }
        push_joined(&mut chunks, &current, separator);

        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, parts: &[&str], separator: &str) {
    let joined = parts.join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
