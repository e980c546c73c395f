//! Split text into overlapping chunks for embedding.
//!
//! Lengths and offsets are measured in chars (Unicode scalar values), so a
//! chunk is always a valid UTF-8 slice of its source.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum chunk length in chars.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of chars shared by neighbouring chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Separators tried when cutting on natural boundaries, strongest first.
const NATURAL_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "! ", "? ", " "];

/// Invalid chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Where chunks are allowed to end.
///
/// `Character` is the default because only fixed windows give every chunk
/// exactly `chunk_size` chars, consecutive chunks exactly `overlap` shared
/// chars, and a chunk count of `ceil((len - overlap) / (chunk_size - overlap))`.
/// `Natural` trades those guarantees for cleaner cuts and must be opted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    /// Fixed windows: chunk `i` starts at `i * (chunk_size - overlap)`.
    #[default]
    Character,
    /// Cut at paragraph, line, sentence or word boundaries when one exists
    /// inside the window, falling back to a hard cut otherwise.
    Natural,
}

/// A contiguous piece of the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Position of this chunk in the sequence, starting at 0.
    pub index: usize,
    pub text: &'a str,
    /// Char offset of the first char in the source.
    pub start: usize,
    /// Char offset one past the last char in the source.
    pub end: usize,
}

impl Chunk<'_> {
    /// Length of the chunk in chars.
    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// Splits `text` into fixed windows of `chunk_size` chars overlapping by `overlap`.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Result<Chunks<'_>, ChunkError> {
    split_with(text, chunk_size, overlap, Boundary::Character)
}

/// Splits `text` using the given boundary strategy.
///
/// Empty text yields an empty sequence.
pub fn split_with(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    boundary: Boundary,
) -> Result<Chunks<'_>, ChunkError> {
    validate(chunk_size, overlap)?;

    let next = (!text.is_empty()).then_some(Position { byte: 0, char: 0 });

    Ok(Chunks {
        text,
        chunk_size,
        overlap,
        boundary,
        next,
        index: 0,
    })
}

/// Checks chunking parameters without splitting anything.
pub fn validate(chunk_size: usize, overlap: usize) -> Result<(), ChunkError> {
    if chunk_size == 0 {
        return Err(ChunkError::ZeroChunkSize);
    }
    if overlap >= chunk_size {
        return Err(ChunkError::OverlapTooLarge {
            chunk_size,
            overlap,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Position {
    byte: usize,
    char: usize,
}

/// Lazy iterator over the chunks of a text.
///
/// Cloning the iterator before it is consumed gives an independent pass over
/// the same chunks.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    chunk_size: usize,
    overlap: usize,
    boundary: Boundary,
    next: Option<Position>,
    index: usize,
}

impl<'a> Chunks<'a> {
    fn emit(&mut self, start: Position, end: Position) -> Chunk<'a> {
        let chunk = Chunk {
            index: self.index,
            text: &self.text[start.byte..end.byte],
            start: start.char,
            end: end.char,
        };
        self.index += 1;
        chunk
    }

    fn next_fixed(&mut self, start: Position) -> Chunk<'a> {
        let end = advance(self.text, start, self.chunk_size);

        self.next = if end.byte >= self.text.len() {
            None
        } else {
            Some(advance(self.text, start, self.chunk_size - self.overlap))
        };

        self.emit(start, end)
    }

    fn next_natural(&mut self, start: Position) -> Chunk<'a> {
        let window_end = advance(self.text, start, self.chunk_size);
        if window_end.byte >= self.text.len() {
            self.next = None;
            return self.emit(start, window_end);
        }

        let window = &self.text[start.byte..window_end.byte];
        let end = match natural_cut(window, self.overlap) {
            Some(cut) => Position {
                byte: start.byte + cut,
                char: start.char + window[..cut].chars().count(),
            },
            None => window_end,
        };

        // The cut always lies more than `overlap` chars past `start`, so the
        // next chunk begins strictly after this one.
        let back = advance(self.text, start, end.char - start.char - self.overlap);
        let next = if self.overlap == 0 {
            end
        } else {
            word_start(self.text, back, end)
        };
        self.next = Some(next);

        self.emit(start, end)
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let chunk = match self.boundary {
            Boundary::Character => self.next_fixed(start),
            Boundary::Natural => self.next_natural(start),
        };
        Some(chunk)
    }
}

/// Moves `n` chars forward from `from`, stopping at the end of `text`.
fn advance(text: &str, from: Position, n: usize) -> Position {
    let rest = &text[from.byte..];
    match rest.char_indices().nth(n) {
        Some((offset, _)) => Position {
            byte: from.byte + offset,
            char: from.char + n,
        },
        None => Position {
            byte: text.len(),
            char: from.char + rest.chars().count(),
        },
    }
}

/// Byte offset just past the strongest separator in `window` that leaves more
/// than `overlap` chars in the chunk.
fn natural_cut(window: &str, overlap: usize) -> Option<usize> {
    NATURAL_SEPARATORS.iter().find_map(|sep| {
        let cut = window.rfind(sep)? + sep.len();
        (window[..cut].chars().count() > overlap).then_some(cut)
    })
}

/// Moves `pos` forward to the nearest word start at or before `limit`.
/// Returns `pos` unchanged when there is none.
fn word_start(text: &str, pos: Position, limit: Position) -> Position {
    let mut prev = text[..pos.byte].chars().next_back();
    let mut current = pos;

    for c in text[pos.byte..].chars() {
        if current.byte > limit.byte {
            break;
        }
        if !c.is_whitespace() && prev.map_or(true, char::is_whitespace) {
            return current;
        }
        prev = Some(c);
        current = Position {
            byte: current.byte + c.len_utf8(),
            char: current.char + 1,
        };
    }
    pos
}
