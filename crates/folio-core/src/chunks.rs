//! Splits a document's token ids into overlapping fixed-size windows for embedding.
//! Window boundaries depend only on the token count, never on the text.

use crate::tokenizer::{Tokenizer, TokenizerError};

/// Default maximum tokens per window.
pub const DEFAULT_MAX_TOKENS: usize = 256;

/// Default number of tokens shared by consecutive windows.
pub const DEFAULT_OVERLAP: usize = 32;

/// Window size and overlap used to chunk every document of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    pub max_tokens: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkParams {
    pub fn new(max_tokens: usize, overlap: usize) -> Result<Self, ChunkError> {
        let params = Self {
            max_tokens,
            overlap,
        };
        params.validate()?;
        Ok(params)
    }

    /// Requires `max_tokens > 0` and `overlap < max_tokens`.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.max_tokens == 0 || self.overlap >= self.max_tokens {
            return Err(ChunkError::InvalidParams {
                max_tokens: self.max_tokens,
                overlap: self.overlap,
            });
        }
        Ok(())
    }

    /// Distance between the starts of consecutive windows.
    pub fn step(&self) -> usize {
        self.max_tokens - self.overlap
    }
}

/// Half-open span `[start, end)` of token positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWindow {
    pub start: usize,
    pub end: usize,
}

impl TokenWindow {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// A decoded window of a document, ready to embed.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub start_token: usize,
    pub end_token: usize,
}

/// Computes the windows covering `token_count` tokens.
///
/// Window `i` covers `[i * step, min(i * step + max_tokens, n))`. The last window may be
/// shorter than `max_tokens`, and nothing is emitted after the window that reaches `n`.
pub fn chunk_windows(token_count: usize, params: ChunkParams) -> Result<Vec<TokenWindow>, ChunkError> {
    params.validate()?;
    let step = params.step();
    let mut windows = Vec::with_capacity(token_count.div_ceil(step));
    let mut start = 0;
    while start < token_count {
        let end = (start + params.max_tokens).min(token_count);
        windows.push(TokenWindow { start, end });
        if end >= token_count {
            break;
        }
        start += step;
    }
    Ok(windows)
}

/// Windows over a token id sequence. Empty input yields no windows.
pub fn chunk(token_ids: &[u32], params: ChunkParams) -> Result<Vec<TokenWindow>, ChunkError> {
    chunk_windows(token_ids.len(), params)
}

/// Encodes `text`, windows the ids and decodes each window back to text.
pub fn chunk_document<T: Tokenizer + ?Sized>(
    tokenizer: &T,
    text: &str,
    params: ChunkParams,
) -> Result<Vec<Chunk>, ChunkError> {
    let ids = tokenizer.encode(text)?;
    let windows = chunk(&ids, params)?;
    let mut chunks = Vec::with_capacity(windows.len());
    for w in windows {
        chunks.push(Chunk {
            text: tokenizer.decode(&ids[w.start..w.end])?,
            start_token: w.start,
            end_token: w.end,
        });
    }
    Ok(chunks)
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("invalid chunking parameters: max_tokens={max_tokens}, overlap={overlap} (need max_tokens > 0 and overlap < max_tokens)")]
    InvalidParams { max_tokens: usize, overlap: usize },
    #[error("tokenizer error: {0}")]
    Tokenizer(#[from] TokenizerError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spans(windows: &[TokenWindow]) -> Vec<(usize, usize)> {
        windows.iter().map(|w| (w.start, w.end)).collect()
    }

    /// Each "token" is one whitespace-separated word; ids index into the word list.
    struct Words(Vec<String>);

    impl Tokenizer for Words {
        fn name(&self) -> &str {
            "words"
        }

        fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerError> {
            Ok((0..text.split_whitespace().count() as u32).collect())
        }

        fn decode(&self, ids: &[u32]) -> Result<String, TokenizerError> {
            let words: Vec<&str> = ids.iter().map(|&i| self.0[i as usize].as_str()).collect();
            Ok(words.join(" "))
        }
    }

    #[test]
    fn two_windows_for_300_tokens() {
        let ids: Vec<u32> = (0..300).collect();
        let params = ChunkParams::new(256, 64).unwrap();
        let w = chunk(&ids, params).unwrap();
        assert_eq!(spans(&w), vec![(0, 256), (192, 300)]);
        assert_eq!(chunk(&ids, params).unwrap(), w);
    }

    #[test]
    fn empty_input_has_no_windows() {
        let w = chunk(&[], ChunkParams::default()).unwrap();
        assert!(w.is_empty());
    }

    #[test]
    fn short_input_is_one_window() {
        let w = chunk_windows(10, ChunkParams::new(256, 64).unwrap()).unwrap();
        assert_eq!(spans(&w), vec![(0, 10)]);
    }

    #[test]
    fn exact_fit_stops_without_dangling_window() {
        // The second window ends exactly at n; no third window starting at 8.
        let w = chunk_windows(12, ChunkParams::new(8, 4).unwrap()).unwrap();
        assert_eq!(spans(&w), vec![(0, 8), (4, 12)]);

        let w = chunk_windows(8, ChunkParams::new(8, 4).unwrap()).unwrap();
        assert_eq!(spans(&w), vec![(0, 8)]);
    }

    #[test]
    fn zero_overlap_tiles_the_sequence() {
        let w = chunk_windows(10, ChunkParams::new(4, 0).unwrap()).unwrap();
        assert_eq!(spans(&w), vec![(0, 4), (4, 8), (8, 10)]);
    }

    #[test]
    fn windows_cover_every_token() {
        let params = ChunkParams::new(7, 3).unwrap();
        for n in 1..60 {
            let w = chunk_windows(n, params).unwrap();
            assert_eq!(w[0].start, 0);
            assert_eq!(w.last().unwrap().end, n);
            assert!(w.iter().all(|x| !x.is_empty() && x.len() <= 7));
            for pair in w.windows(2) {
                assert_eq!(pair[1].start - pair[0].start, params.step());
            }
        }
    }

    #[test]
    fn rejects_invalid_params() {
        assert!(matches!(
            ChunkParams::new(0, 0),
            Err(ChunkError::InvalidParams { .. })
        ));
        assert!(matches!(
            ChunkParams::new(4, 4),
            Err(ChunkError::InvalidParams { .. })
        ));
        let bad = ChunkParams {
            max_tokens: 4,
            overlap: 9,
        };
        assert!(chunk_windows(10, bad).is_err());
    }

    #[test]
    fn chunk_document_decodes_windows() {
        let text = "a b c d e f g";
        let tok = Words(text.split_whitespace().map(String::from).collect());
        let chunks = chunk_document(&tok, text, ChunkParams::new(4, 1).unwrap()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "a b c d");
        assert_eq!((chunks[0].start_token, chunks[0].end_token), (0, 4));
        assert_eq!(chunks[1].text, "d e f g");
        assert_eq!((chunks[1].start_token, chunks[1].end_token), (3, 7));
    }
}
