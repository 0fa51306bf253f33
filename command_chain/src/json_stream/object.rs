//! Lazily parsed JSON object.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::json_stream::error::JsonStreamError;
use crate::json_stream::node::{JsonNode, Phase, SharedTokenator};
use crate::json_stream::string::JsonString;

#[derive(Debug)]
struct ObjectState {
    phase: Phase,
    /// Every entry parsed so far, in document order.
    entries: Vec<(String, JsonNode)>,
    /// Entries already handed out by [`JsonObject::next_entry`].
    read_index: usize,
}

/// Handle onto an object that is parsed entry by entry.
///
/// Entries are retained once parsed so key lookups and full materialization
/// keep working after the cursor has moved past the object.
#[derive(Debug, Clone)]
pub struct JsonObject {
    cursor: SharedTokenator,
    char_position: usize,
    state: Rc<RefCell<ObjectState>>,
}

impl JsonObject {
    pub(crate) fn new(cursor: SharedTokenator, char_position: usize) -> Self {
        Self {
            cursor,
            char_position,
            state: Rc::new(RefCell::new(ObjectState {
                phase: Phase::Pending,
                entries: Vec::new(),
                read_index: 0,
            })),
        }
    }

    #[must_use]
    pub fn char_position(&self) -> usize {
        self.char_position
    }

    /// True once the closing brace has been consumed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.borrow().phase == Phase::Closed
    }

    /// Yields the next entry not yet returned by this method.
    ///
    /// A compound value returned earlier that the caller did not finish is
    /// drained before the following entry is parsed.
    pub fn next_entry(&self) -> Result<Option<(String, JsonNode)>, JsonStreamError> {
        loop {
            {
                let mut state = self.state.borrow_mut();
                if state.read_index < state.entries.len() {
                    let entry = state.entries[state.read_index].clone();
                    state.read_index += 1;
                    return Ok(Some(entry));
                }
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    /// Looks up a key, parsing further entries until it is found or the object ends.
    pub fn get(&self, key: &str) -> Result<Option<JsonNode>, JsonStreamError> {
        if let Some(value) = self.find_parsed(key) {
            return Ok(Some(value));
        }
        while self.pull()? {
            let state = self.state.borrow();
            if let Some((name, value)) = state.entries.last() {
                if name == key {
                    return Ok(Some(value.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Entry at `index` in document order, parsing up to it if needed.
    pub fn entry_at(&self, index: usize) -> Result<Option<(String, JsonNode)>, JsonStreamError> {
        loop {
            if let Some(entry) = self.state.borrow().entries.get(index) {
                return Ok(Some(entry.clone()));
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    /// Reads through the closing brace, retaining every entry.
    pub fn finish(&self) -> Result<(), JsonStreamError> {
        while self.pull()? {}
        Ok(())
    }

    /// Materializes the complete object with keys in document order.
    pub fn value(&self) -> Result<Value, JsonStreamError> {
        self.finish()?;
        let entries = self.state.borrow().entries.clone();
        let mut map = Map::with_capacity(entries.len());
        for (key, node) in entries {
            map.insert(key, node.value()?);
        }
        Ok(Value::Object(map))
    }

    fn find_parsed(&self, key: &str) -> Option<JsonNode> {
        self.state
            .borrow()
            .entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.clone())
    }

    /// Parses one more entry. Returns `Ok(false)` once the object is closed.
    fn pull(&self) -> Result<bool, JsonStreamError> {
        if self.is_closed() {
            return Ok(false);
        }
        let result = self.pull_entry();
        if let Err(error) = &result {
            self.cursor.borrow_mut().poison(error.clone());
        }
        result
    }

    fn pull_entry(&self) -> Result<bool, JsonStreamError> {
        let previous = self
            .state
            .borrow()
            .entries
            .last()
            .map(|(_, value)| value.clone());
        if let Some(previous) = previous {
            previous.finish()?;
        }

        let key_position = {
            let mut tokenator = self.cursor.borrow_mut();
            let mut state = self.state.borrow_mut();
            if state.phase == Phase::Pending {
                tokenator.skip_whitespace()?;
                tokenator.open('{')?;
                state.phase = Phase::Open;
            }
            tokenator.skip_whitespace()?;
            let position = tokenator.char_position();
            match tokenator.peek()? {
                '}' => {
                    tokenator.close()?;
                    state.phase = Phase::Closed;
                    return Ok(false);
                }
                ',' if !state.entries.is_empty() => {
                    tokenator.next_char()?;
                    tokenator.skip_whitespace()?;
                }
                '"' if state.entries.is_empty() => {}
                symbol => return Err(JsonStreamError::UnexpectedSymbol { symbol, position }),
            }
            let position = tokenator.char_position();
            let symbol = tokenator.peek()?;
            if symbol != '"' {
                return Err(JsonStreamError::UnexpectedSymbol { symbol, position });
            }
            position
        };

        let key = JsonString::new(self.cursor.clone(), key_position).join()?;
        {
            let mut tokenator = self.cursor.borrow_mut();
            tokenator.skip_whitespace()?;
            tokenator.expect(':')?;
        }
        let value = JsonNode::read_from(&self.cursor)?;
        self.state.borrow_mut().entries.push((key, value));
        Ok(true)
    }
}
