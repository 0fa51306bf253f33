//! Lazily parsed JSON string.
//!
//! Decoded text is produced in segments that end where a source fragment
//! ends, so a consumer sees each piece of a long string as soon as the model
//! has emitted it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::json_stream::error::JsonStreamError;
use crate::json_stream::node::{Phase, SharedTokenator};
use crate::json_stream::tokenator::Tokenator;

#[derive(Debug)]
struct StringState {
    phase: Phase,
    segments: Vec<String>,
    read_index: usize,
}

/// Handle onto a string literal that is decoded segment by segment.
#[derive(Debug, Clone)]
pub struct JsonString {
    cursor: SharedTokenator,
    char_position: usize,
    state: Rc<RefCell<StringState>>,
}

impl JsonString {
    pub(crate) fn new(cursor: SharedTokenator, char_position: usize) -> Self {
        Self {
            cursor,
            char_position,
            state: Rc::new(RefCell::new(StringState {
                phase: Phase::Pending,
                segments: Vec::new(),
                read_index: 0,
            })),
        }
    }

    #[must_use]
    pub fn char_position(&self) -> usize {
        self.char_position
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().phase == Phase::Closed
    }

    /// Next decoded segment not yet returned by this method.
    pub fn read_chunk(&self) -> Result<Option<String>, JsonStreamError> {
        loop {
            {
                let mut state = self.state.borrow_mut();
                if state.read_index < state.segments.len() {
                    let segment = state.segments[state.read_index].clone();
                    state.read_index += 1;
                    return Ok(Some(segment));
                }
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    /// Decoded segment at `index`, reading up to it if needed.
    pub fn segment_at(&self, index: usize) -> Result<Option<String>, JsonStreamError> {
        loop {
            if let Some(segment) = self.state.borrow().segments.get(index) {
                return Ok(Some(segment.clone()));
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    /// Reads through the closing quote.
    pub fn finish(&self) -> Result<(), JsonStreamError> {
        while self.pull()? {}
        Ok(())
    }

    /// Complete decoded contents.
    pub fn join(&self) -> Result<String, JsonStreamError> {
        self.finish()?;
        Ok(self.state.borrow().segments.concat())
    }

    fn pull(&self) -> Result<bool, JsonStreamError> {
        if self.is_closed() {
            return Ok(false);
        }
        let result = self.pull_segment();
        if let Err(error) = &result {
            self.cursor.borrow_mut().poison(error.clone());
        }
        result
    }

    fn pull_segment(&self) -> Result<bool, JsonStreamError> {
        let mut tokenator = self.cursor.borrow_mut();
        let mut state = self.state.borrow_mut();
        if state.phase == Phase::Pending {
            tokenator.expect('"')?;
            state.phase = Phase::Open;
        }

        let mut text = String::new();
        loop {
            if !text.is_empty() && tokenator.is_chunk_exhausted() {
                break;
            }
            match tokenator.next_char()? {
                '"' => {
                    state.phase = Phase::Closed;
                    break;
                }
                '\\' => text.push(read_escape(&mut tokenator)?),
                symbol => text.push(symbol),
            }
        }

        if text.is_empty() {
            return Ok(false);
        }
        state.segments.push(text);
        Ok(true)
    }
}

fn read_escape(tokenator: &mut Tokenator) -> Result<char, JsonStreamError> {
    let position = tokenator.char_position();
    let decoded = match tokenator.next_char()? {
        '"' => '"',
        '\\' => '\\',
        '/' => '/',
        'b' => '\u{8}',
        'f' => '\u{c}',
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'u' => return read_unicode_escape(tokenator, position),
        symbol => return Err(JsonStreamError::InvalidEscapeSequence { symbol, position }),
    };
    Ok(decoded)
}

/// Decodes the `XXXX` of a `\uXXXX` escape, joining UTF-16 surrogate pairs.
fn read_unicode_escape(tokenator: &mut Tokenator, position: usize) -> Result<char, JsonStreamError> {
    let invalid = JsonStreamError::InvalidEscapeSequence {
        symbol: 'u',
        position,
    };
    let high = read_hex4(tokenator)?;
    let code = if (0xD800..0xDC00).contains(&high) {
        if tokenator.next_char()? != '\\' || tokenator.next_char()? != 'u' {
            return Err(invalid);
        }
        let low = read_hex4(tokenator)?;
        if !(0xDC00..0xE000).contains(&low) {
            return Err(invalid);
        }
        0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00)
    } else {
        high
    };
    char::from_u32(code).ok_or(invalid)
}

fn read_hex4(tokenator: &mut Tokenator) -> Result<u32, JsonStreamError> {
    let mut value = 0;
    for _ in 0..4 {
        let position = tokenator.char_position();
        let symbol = tokenator.next_char()?;
        let digit = symbol
            .to_digit(16)
            .ok_or(JsonStreamError::InvalidEscapeSequence { symbol, position })?;
        value = value * 16 + digit;
    }
    Ok(value)
}
