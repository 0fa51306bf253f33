//! Single-character cursor over a stream of text fragments.
//!
//! The cursor holds at most one fragment at a time. A new fragment is pulled
//! from the source only when the current one has been fully consumed, so the
//! parser never buffers more text than it needs to resolve the next symbol.

use std::fmt;

use crate::json_stream::error::JsonStreamError;
use crate::model::ModelError;

/// Deepest nesting of objects and arrays a document may have.
pub const MAX_DEPTH: usize = 128;

/// Ordered, finite, non-restartable sequence of text fragments.
pub type ChunkSource = Box<dyn Iterator<Item = Result<String, ModelError>>>;

/// Peekable character cursor with position tracking across fragment boundaries.
pub struct Tokenator {
    source: ChunkSource,
    chunk: Vec<char>,
    /// Characters contained in all fragments before the current one.
    chunk_position: usize,
    /// Offset of the next unread character inside the current fragment.
    char_offset: usize,
    exhausted: bool,
    /// Objects and arrays opened but not yet closed.
    depth: usize,
    failure: Option<JsonStreamError>,
}

impl Tokenator {
    pub fn new(source: impl Iterator<Item = Result<String, ModelError>> + 'static) -> Self {
        Self {
            source: Box::new(source),
            chunk: Vec::new(),
            chunk_position: 0,
            char_offset: 0,
            exhausted: false,
            depth: 0,
            failure: None,
        }
    }

    /// Cursor over an in-memory list of fragments.
    pub fn from_fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'static,
        S: Into<String> + 'static,
    {
        Self::new(
            fragments
                .into_iter()
                .map(|fragment| Ok::<String, ModelError>(fragment.into())),
        )
    }

    /// Absolute character position of the next unread character.
    #[must_use]
    pub fn char_position(&self) -> usize {
        self.chunk_position + self.char_offset
    }

    /// True when the current fragment has no unread characters left.
    ///
    /// Does not pull from the source.
    #[must_use]
    pub fn is_chunk_exhausted(&self) -> bool {
        self.char_offset >= self.chunk.len()
    }

    /// Returns the next character without consuming it.
    pub fn peek(&mut self) -> Result<char, JsonStreamError> {
        match self.peek_opt()? {
            Some(symbol) => Ok(symbol),
            None => Err(JsonStreamError::UnexpectedEndOfStream {
                position: self.char_position(),
            }),
        }
    }

    /// Returns the next character, or `None` at a clean end of stream.
    pub fn peek_opt(&mut self) -> Result<Option<char>, JsonStreamError> {
        if self.fill()? {
            Ok(Some(self.chunk[self.char_offset]))
        } else {
            Ok(None)
        }
    }

    /// Consumes and returns the next character.
    pub fn next_char(&mut self) -> Result<char, JsonStreamError> {
        let symbol = self.peek()?;
        self.char_offset += 1;
        Ok(symbol)
    }

    /// Consumes the next character, failing unless it equals `expected`.
    pub fn expect(&mut self, expected: char) -> Result<(), JsonStreamError> {
        let symbol = self.peek()?;
        if symbol != expected {
            return Err(JsonStreamError::UnexpectedSymbol {
                symbol,
                position: self.char_position(),
            });
        }
        self.char_offset += 1;
        Ok(())
    }

    /// Number of objects and arrays enclosing the cursor.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Consumes the opening delimiter of an object or array.
    pub fn open(&mut self, delimiter: char) -> Result<(), JsonStreamError> {
        let position = self.char_position();
        if self.depth >= MAX_DEPTH {
            return Err(JsonStreamError::NestingTooDeep { position });
        }
        self.expect(delimiter)?;
        self.depth += 1;
        Ok(())
    }

    /// Consumes the closing delimiter of an object or array.
    pub fn close(&mut self) -> Result<char, JsonStreamError> {
        let symbol = self.next_char()?;
        self.depth = self.depth.saturating_sub(1);
        Ok(symbol)
    }

    /// Advances past ASCII whitespace.
    pub fn skip_whitespace(&mut self) -> Result<(), JsonStreamError> {
        while let Some(symbol) = self.peek_opt()? {
            if !symbol.is_ascii_whitespace() {
                break;
            }
            self.char_offset += 1;
        }
        Ok(())
    }

    /// Records a failure so every later read re-raises it.
    ///
    /// Nodes sharing this cursor observe the same error instead of continuing
    /// from an undefined position.
    pub fn poison(&mut self, error: JsonStreamError) {
        if self.failure.is_none() {
            self.failure = Some(error);
        }
    }

    /// Ensures a character is available. Returns `Ok(false)` at end of stream.
    fn fill(&mut self) -> Result<bool, JsonStreamError> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        while self.char_offset >= self.chunk.len() {
            if self.exhausted {
                return Ok(false);
            }
            match self.source.next() {
                Some(Ok(fragment)) => {
                    self.chunk_position += self.chunk.len();
                    self.chunk = fragment.chars().collect();
                    self.char_offset = 0;
                }
                Some(Err(source)) => {
                    let error = JsonStreamError::Source {
                        source,
                        position: self.char_position(),
                    };
                    self.failure = Some(error.clone());
                    return Err(error);
                }
                None => self.exhausted = true,
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for Tokenator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenator")
            .field("chunk_position", &self.chunk_position)
            .field("char_offset", &self.char_offset)
            .field("exhausted", &self.exhausted)
            .field("depth", &self.depth)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_char_spans_fragment_boundaries() {
        let mut cursor = Tokenator::from_fragments(vec!["ab", "", "c"]);
        assert_eq!(cursor.next_char().expect("a"), 'a');
        assert_eq!(cursor.next_char().expect("b"), 'b');
        assert_eq!(cursor.char_position(), 2);
        assert_eq!(cursor.next_char().expect("c"), 'c');
        assert_eq!(cursor.char_position(), 3);
        assert_eq!(
            cursor.peek(),
            Err(JsonStreamError::UnexpectedEndOfStream { position: 3 })
        );
    }

    #[test]
    fn positions_count_characters_not_bytes() {
        let mut cursor = Tokenator::from_fragments(vec!["é", "ü!"]);
        cursor.next_char().expect("e");
        cursor.next_char().expect("u");
        assert_eq!(cursor.char_position(), 2);
        assert_eq!(cursor.peek().expect("bang"), '!');
    }

    #[test]
    fn skip_whitespace_stops_at_first_symbol() {
        let mut cursor = Tokenator::from_fragments(vec!["  \n", "\t {"]);
        cursor.skip_whitespace().expect("skip");
        assert_eq!(cursor.peek().expect("brace"), '{');
        assert_eq!(cursor.char_position(), 5);
    }

    #[test]
    fn chunk_exhaustion_does_not_pull() {
        let mut cursor = Tokenator::from_fragments(vec!["a", "b"]);
        assert_eq!(cursor.next_char().expect("a"), 'a');
        assert!(cursor.is_chunk_exhausted());
        assert_eq!(cursor.char_position(), 1);
    }

    #[test]
    fn source_failure_is_sticky() {
        let source = vec![
            Ok("{".to_string()),
            Err(ModelError::Transport {
                message: "connection reset".to_string(),
            }),
            Ok("}".to_string()),
        ];
        let mut cursor = Tokenator::new(source.into_iter());
        cursor.next_char().expect("brace");
        let first = cursor.peek().expect_err("stream failure");
        assert_eq!(first.position(), 1);
        assert!(first.model_failure().is_some());
        assert_eq!(cursor.peek().expect_err("still failing"), first);
    }

    #[test]
    fn open_and_close_track_depth() {
        let mut cursor = Tokenator::from_fragments(vec!["[{", "}]"]);
        cursor.open('[').expect("array");
        cursor.open('{').expect("object");
        assert_eq!(cursor.depth(), 2);
        assert_eq!(cursor.close().expect("brace"), '}');
        assert_eq!(cursor.close().expect("bracket"), ']');
        assert_eq!(cursor.depth(), 0);
    }

    #[test]
    fn open_refuses_past_max_depth() {
        let text = "[".repeat(MAX_DEPTH + 1);
        let mut cursor = Tokenator::from_fragments(vec![text]);
        for _ in 0..MAX_DEPTH {
            cursor.open('[').expect("within limit");
        }
        assert_eq!(
            cursor.open('['),
            Err(JsonStreamError::NestingTooDeep {
                position: MAX_DEPTH
            })
        );
    }

    #[test]
    fn poison_is_reraised_on_next_read() {
        let mut cursor = Tokenator::from_fragments(vec!["abc"]);
        let error = JsonStreamError::UnexpectedSymbol {
            symbol: 'a',
            position: 0,
        };
        cursor.poison(error.clone());
        assert_eq!(cursor.next_char(), Err(error));
    }
}
