//! Document chunker.
//!
//! Splits document content into ordered, fixed-size character windows with
//! optional overlap. Windows holding only whitespace are discarded; the
//! rest of the split is purely positional, with no randomness and no
//! boundary heuristics, so re-chunking unchanged content always yields
//! byte-identical chunks. That idempotence is what makes reindexing safe to
//! repeat.

use crate::core::config::ChunkingConfig;
use crate::core::errors::ApiError;

/// One chunk of a document, in document order.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Zero-based ordinal within the document; contiguous and gap-free.
    pub chunk_index: usize,
    /// Character offset of the chunk start in the original content.
    pub start_offset: usize,
    pub text: String,
}

pub fn validate_config(config: &ChunkingConfig) -> Result<(), ApiError> {
    if config.chunk_size == 0 {
        return Err(ApiError::InvalidConfig(
            "chunk_size must be greater than zero".to_string(),
        ));
    }
    if config.chunk_overlap >= config.chunk_size {
        return Err(ApiError::InvalidConfig(format!(
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            config.chunk_overlap, config.chunk_size
        )));
    }
    Ok(())
}

/// Split `content` into overlapping chunks.
///
/// Empty content yields an empty sequence; content that fits in one chunk
/// yields exactly one chunk, even when overlap would otherwise produce a
/// trailing window that is a suffix of the last full one. Windows that
/// contain only whitespace are dropped, so whitespace-only content also
/// yields no chunks.
pub fn split_text(content: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, ApiError> {
    validate_config(config)?;

    let chars: Vec<char> = content.chars().collect();
    let total_chars = chars.len();

    let mut chunks = Vec::new();
    if total_chars == 0 {
        return Ok(chunks);
    }

    let step = config.chunk_size - config.chunk_overlap;
    let mut start = 0;
    let mut chunk_index = 0;

    while start < total_chars {
        let end = (start + config.chunk_size).min(total_chars);
        let text: String = chars[start..end].iter().collect();

        if !text.trim().is_empty() {
            chunks.push(TextChunk {
                chunk_index,
                start_offset: start,
                text,
            });
            chunk_index += 1;
        }

        // The content is exhausted; stepping again would only re-emit a
        // suffix of this window.
        if end == total_chars {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
