//! # Text Chunking Module
//!
//! Splits extracted document text into overlapping, bounded windows suitable
//! for embedding.
//!
//! ## Chunking Strategy
//!
//! The chunker slides a window of at most `max_chars` characters over the text:
//! 1. Inside the window it looks for the last natural boundary, preferring a
//!    blank line, then the end of a sentence or a line, then any whitespace
//! 2. Without a usable boundary it cuts hard at `max_chars`
//! 3. The next window starts exactly `overlap` characters before the cut
//! 4. The final window runs to the end of the text, so nothing is dropped
//!
//! Lengths are counted in Unicode scalar values, never bytes, so multi-byte
//! characters are never split.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::processor::ChunkOptions;
use crate::processor::error::ProcessError;

/// A chunk of text with its position in the document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// The text of the chunk
    pub text: String,

    /// The position of the chunk in the original document
    pub position: usize,
}

/// Split text into overlapping chunks
///
/// # Arguments
///
/// * `text` - The text to chunk
/// * `options` - Chunking options
///
/// # Returns
///
/// A non-empty vector of chunks in document order
#[instrument(skip(text), fields(chars = text.len()))]
pub fn chunk_text(text: &str, options: &ChunkOptions) -> Result<Vec<TextChunk>, ProcessError> {
    options.validate()?;
    if text.is_empty() {
        return Err(ProcessError::Chunking("there is no text to split".to_string()));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        if chars.len() - start <= options.max_chars {
            chunks.push(TextChunk {
                text: chars[start..].iter().collect(),
                position: chunks.len(),
            });
            break;
        }

        let end = find_split_point(&chars, start, options);
        chunks.push(TextChunk {
            text: chars[start..end].iter().collect(),
            position: chunks.len(),
        });

        // end > start + overlap, so the window always advances
        start = end - options.overlap;
    }

    debug!("Created {} chunks", chunks.len());
    Ok(chunks)
}

/// Find where the window starting at `start` should end
///
/// Candidates too close to the window start are ignored: a cut there would not
/// clear the overlap, or would produce a uselessly small chunk.
fn find_split_point(chars: &[char], start: usize, options: &ChunkOptions) -> usize {
    let hard_end = start + options.max_chars;
    let min_len = std::cmp::max(options.overlap + 1, options.max_chars * 3 / 10);
    let earliest = start + min_len;

    let is_paragraph = |i: usize| i >= 2 && chars[i - 1] == '\n' && chars[i - 2] == '\n';
    let is_sentence = |i: usize| {
        chars[i - 1] == '\n'
            || (i >= 2 && chars[i - 1].is_whitespace() && matches!(chars[i - 2], '.' | '!' | '?'))
    };
    let is_word = |i: usize| chars[i - 1].is_whitespace();

    let last_matching =
        |pred: &dyn Fn(usize) -> bool| (earliest..=hard_end).rev().find(|&i| pred(i));

    last_matching(&is_paragraph)
        .or_else(|| last_matching(&is_sentence))
        .or_else(|| last_matching(&is_word))
        .unwrap_or(hard_end)
}
