//! Lazily parsed JSON array.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::json_stream::error::JsonStreamError;
use crate::json_stream::node::{JsonNode, Phase, SharedTokenator};

#[derive(Debug)]
struct ArrayState {
    phase: Phase,
    items: Vec<JsonNode>,
    read_index: usize,
}

/// Handle onto an array that is parsed element by element.
#[derive(Debug, Clone)]
pub struct JsonArray {
    cursor: SharedTokenator,
    char_position: usize,
    state: Rc<RefCell<ArrayState>>,
}

impl JsonArray {
    pub(crate) fn new(cursor: SharedTokenator, char_position: usize) -> Self {
        Self {
            cursor,
            char_position,
            state: Rc::new(RefCell::new(ArrayState {
                phase: Phase::Pending,
                items: Vec::new(),
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

    /// Yields the next element not yet returned by this method.
    pub fn next_item(&self) -> Result<Option<JsonNode>, JsonStreamError> {
        loop {
            {
                let mut state = self.state.borrow_mut();
                if state.read_index < state.items.len() {
                    let item = state.items[state.read_index].clone();
                    state.read_index += 1;
                    return Ok(Some(item));
                }
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    /// Element at `index`, parsing up to it if needed.
    pub fn item_at(&self, index: usize) -> Result<Option<JsonNode>, JsonStreamError> {
        loop {
            if let Some(item) = self.state.borrow().items.get(index) {
                return Ok(Some(item.clone()));
            }
            if !self.pull()? {
                return Ok(None);
            }
        }
    }

    pub fn finish(&self) -> Result<(), JsonStreamError> {
        while self.pull()? {}
        Ok(())
    }

    pub fn value(&self) -> Result<Value, JsonStreamError> {
        self.finish()?;
        let items = self.state.borrow().items.clone();
        items
            .iter()
            .map(JsonNode::value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }

    fn pull(&self) -> Result<bool, JsonStreamError> {
        if self.is_closed() {
            return Ok(false);
        }
        let result = self.pull_item();
        if let Err(error) = &result {
            self.cursor.borrow_mut().poison(error.clone());
        }
        result
    }

    fn pull_item(&self) -> Result<bool, JsonStreamError> {
        let previous = self.state.borrow().items.last().cloned();
        if let Some(previous) = previous {
            previous.finish()?;
        }

        {
            let mut tokenator = self.cursor.borrow_mut();
            let mut state = self.state.borrow_mut();
            if state.phase == Phase::Pending {
                tokenator.skip_whitespace()?;
                tokenator.open('[')?;
                state.phase = Phase::Open;
            }
            tokenator.skip_whitespace()?;
            let position = tokenator.char_position();
            let symbol = tokenator.peek()?;
            match symbol {
                ']' => {
                    tokenator.close()?;
                    state.phase = Phase::Closed;
                    return Ok(false);
                }
                ',' if !state.items.is_empty() => {
                    tokenator.next_char()?;
                }
                _ if state.items.is_empty() && symbol != ',' => {}
                _ => return Err(JsonStreamError::UnexpectedSymbol { symbol, position }),
            }
        }

        let item = JsonNode::read_from(&self.cursor)?;
        self.state.borrow_mut().items.push(item);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::json_stream::error::JsonStreamError;
    use crate::json_stream::node::{JsonNode, NodeType};

    #[test]
    fn elements_are_exposed_before_the_array_closes() {
        let node = JsonNode::parse_fragments(vec!["[\"first\", ", "2"]).expect("root");
        let array = node.as_array().expect("array");
        let first = array.next_item().expect("first").expect("element");
        assert_eq!(first.node_type(), NodeType::String);
        assert_eq!(
            first.as_string().expect("string").join().expect("join"),
            "first"
        );
        let second = array.next_item().expect("second").expect("element");
        assert_eq!(second.value().expect("value"), json!(2));
        let error = array.next_item().expect_err("unterminated");
        assert_eq!(error, JsonStreamError::UnexpectedEndOfStream { position: 11 });
    }

    #[test]
    fn nested_arrays_materialize() {
        let node = JsonNode::parse_fragments(vec!["[[1,[]],", " {\"k\": null}, []]"]).expect("root");
        assert_eq!(
            node.value().expect("value"),
            json!([[1, []], {"k": null}, []])
        );
    }

    #[test]
    fn unread_elements_are_drained_between_siblings() {
        let node = JsonNode::parse_fragments(vec!["[\"abc\", [1, 2], 3]"]).expect("root");
        let array = node.as_array().expect("array");
        let text = array.next_item().expect("text").expect("element");
        let nested = array.next_item().expect("nested").expect("element");
        let third = array.next_item().expect("third").expect("element");
        assert_eq!(third.value().expect("third"), json!(3));
        assert_eq!(text.value().expect("text"), json!("abc"));
        assert_eq!(nested.value().expect("nested"), json!([1, 2]));
    }

    #[test]
    fn missing_separator_is_rejected() {
        let node = JsonNode::parse_fragments(vec!["[1 2]"]).expect("root");
        let error = node.value().expect_err("separator");
        assert_eq!(
            error,
            JsonStreamError::UnexpectedSymbol {
                symbol: '2',
                position: 3,
            }
        );
    }

    #[test]
    fn leading_comma_is_rejected() {
        let node = JsonNode::parse_fragments(vec!["[,1]"]).expect("root");
        let error = node.value().expect_err("comma");
        assert_eq!(
            error,
            JsonStreamError::UnexpectedSymbol {
                symbol: ',',
                position: 1,
            }
        );
    }
}
