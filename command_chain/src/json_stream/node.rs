//! JSON node variants and root dispatch.
//!
//! Atomic nodes (number, boolean, null) are resolved eagerly. Compound nodes
//! (object, array, string) are handles onto the shared cursor and parse
//! themselves on demand; see [`JsonObject`], [`JsonArray`] and [`JsonString`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde_json::{Number, Value};

use crate::json_stream::array::JsonArray;
use crate::json_stream::chunks::NodeChunks;
use crate::json_stream::error::JsonStreamError;
use crate::json_stream::object::JsonObject;
use crate::json_stream::string::JsonString;
use crate::json_stream::tokenator::{MAX_DEPTH, Tokenator};

/// Cursor shared by every node parsed from the same stream.
pub(crate) type SharedTokenator = Rc<RefCell<Tokenator>>;

/// Parse progress of a compound node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Opening delimiter not consumed yet.
    Pending,
    Open,
    Closed,
}

/// Type tag of a JSON node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl NodeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A JSON value that may still be streaming in.
#[derive(Debug, Clone)]
pub enum JsonNode {
    Object(JsonObject),
    Array(JsonArray),
    String(JsonString),
    Number(JsonNumber),
    Boolean(JsonBoolean),
    Null(JsonNull),
}

impl JsonNode {
    /// Resolves the root node of a document.
    ///
    /// Compound roots are returned as soon as their leading character is seen;
    /// nothing beyond that character is read until the caller pulls.
    pub fn parse(tokenator: Tokenator) -> Result<Self, JsonStreamError> {
        let cursor = Rc::new(RefCell::new(tokenator));
        Self::read_from(&cursor)
    }

    /// Parses a complete in-memory document split into the given fragments.
    pub fn parse_fragments<I, S>(fragments: I) -> Result<Self, JsonStreamError>
    where
        I: IntoIterator<Item = S>,
        I::IntoIter: 'static,
        S: Into<String> + 'static,
    {
        Self::parse(Tokenator::from_fragments(fragments))
    }

    pub(crate) fn read_from(cursor: &SharedTokenator) -> Result<Self, JsonStreamError> {
        let result = dispatch(cursor);
        if let Err(error) = &result {
            cursor.borrow_mut().poison(error.clone());
        }
        result
    }

    #[must_use]
    pub fn node_type(&self) -> NodeType {
        match self {
            Self::Object(_) => NodeType::Object,
            Self::Array(_) => NodeType::Array,
            Self::String(_) => NodeType::String,
            Self::Number(_) => NodeType::Number,
            Self::Boolean(_) => NodeType::Boolean,
            Self::Null(_) => NodeType::Null,
        }
    }

    /// Character offset at which the node started.
    #[must_use]
    pub fn char_position(&self) -> usize {
        match self {
            Self::Object(node) => node.char_position(),
            Self::Array(node) => node.char_position(),
            Self::String(node) => node.char_position(),
            Self::Number(node) => node.char_position,
            Self::Boolean(node) => node.char_position,
            Self::Null(node) => node.char_position,
        }
    }

    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_) | Self::String(_))
    }

    pub fn as_object(&self) -> Result<&JsonObject, JsonStreamError> {
        match self {
            Self::Object(node) => Ok(node),
            other => Err(other.mismatch(NodeType::Object)),
        }
    }

    pub fn as_array(&self) -> Result<&JsonArray, JsonStreamError> {
        match self {
            Self::Array(node) => Ok(node),
            other => Err(other.mismatch(NodeType::Array)),
        }
    }

    pub fn as_string(&self) -> Result<&JsonString, JsonStreamError> {
        match self {
            Self::String(node) => Ok(node),
            other => Err(other.mismatch(NodeType::String)),
        }
    }

    /// Reads the rest of this node so the shared cursor moves past it.
    ///
    /// Everything read is retained on the node. Atomic nodes are already complete.
    pub fn finish(&self) -> Result<(), JsonStreamError> {
        match self {
            Self::Object(node) => node.finish(),
            Self::Array(node) => node.finish(),
            Self::String(node) => node.finish(),
            Self::Number(_) | Self::Boolean(_) | Self::Null(_) => Ok(()),
        }
    }

    /// Materializes the complete value, reading whatever is still pending.
    pub fn value(&self) -> Result<Value, JsonStreamError> {
        match self {
            Self::Object(node) => node.value(),
            Self::Array(node) => node.value(),
            Self::String(node) => node.join().map(Value::String),
            Self::Number(node) => Ok(Value::Number(node.value.clone())),
            Self::Boolean(node) => Ok(Value::Bool(node.value)),
            Self::Null(_) => Ok(Value::Null),
        }
    }

    /// Lazy normalized serialization of this node.
    ///
    /// Chunks are produced as the underlying stream is read: string contents
    /// arrive in pieces aligned to the source fragments.
    #[must_use]
    pub fn chunks(&self) -> NodeChunks {
        NodeChunks::new(self.clone())
    }

    /// Collects [`JsonNode::chunks`] into one string.
    pub fn to_json_text(&self) -> Result<String, JsonStreamError> {
        self.chunks().collect()
    }

    fn mismatch(&self, expected: NodeType) -> JsonStreamError {
        JsonStreamError::TypeMismatch {
            expected,
            actual: self.node_type(),
            position: self.char_position(),
        }
    }
}

/// Eagerly parsed JSON number.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonNumber {
    value: Number,
    char_position: usize,
}

impl JsonNumber {
    #[must_use]
    pub fn value(&self) -> &Number {
        &self.value
    }
}

/// Eagerly parsed JSON boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonBoolean {
    value: bool,
    char_position: usize,
}

impl JsonBoolean {
    #[must_use]
    pub fn value(&self) -> bool {
        self.value
    }
}

/// JSON `null`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonNull {
    char_position: usize,
}

fn dispatch(cursor: &SharedTokenator) -> Result<JsonNode, JsonStreamError> {
    let (symbol, position, depth) = {
        let mut tokenator = cursor.borrow_mut();
        tokenator.skip_whitespace()?;
        (tokenator.peek()?, tokenator.char_position(), tokenator.depth())
    };
    if matches!(symbol, '{' | '[') && depth >= MAX_DEPTH {
        return Err(JsonStreamError::NestingTooDeep { position });
    }
    match symbol {
        '{' => Ok(JsonNode::Object(JsonObject::new(cursor.clone(), position))),
        '[' => Ok(JsonNode::Array(JsonArray::new(cursor.clone(), position))),
        '"' => Ok(JsonNode::String(JsonString::new(cursor.clone(), position))),
        '-' | '0'..='9' => {
            let token = collect_token(&mut cursor.borrow_mut())?;
            let value = serde_json::from_str::<Number>(&token).map_err(|_| {
                JsonStreamError::InvalidLiteral {
                    node_type: NodeType::Number,
                    token: token.clone(),
                    position,
                }
            })?;
            Ok(JsonNode::Number(JsonNumber {
                value,
                char_position: position,
            }))
        }
        't' | 'f' => {
            let token = collect_token(&mut cursor.borrow_mut())?;
            let value = match token.as_str() {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(JsonStreamError::InvalidLiteral {
                        node_type: NodeType::Boolean,
                        token,
                        position,
                    });
                }
            };
            Ok(JsonNode::Boolean(JsonBoolean {
                value,
                char_position: position,
            }))
        }
        'n' => {
            let token = collect_token(&mut cursor.borrow_mut())?;
            if token != "null" {
                return Err(JsonStreamError::InvalidLiteral {
                    node_type: NodeType::Null,
                    token,
                    position,
                });
            }
            Ok(JsonNode::Null(JsonNull {
                char_position: position,
            }))
        }
        other => Err(JsonStreamError::UnexpectedSymbol {
            symbol: other,
            position,
        }),
    }
}

/// Consumes a run of characters up to whitespace, a structural delimiter, or
/// the end of the stream.
fn collect_token(tokenator: &mut Tokenator) -> Result<String, JsonStreamError> {
    let mut token = String::new();
    while let Some(symbol) = tokenator.peek_opt()? {
        if symbol.is_ascii_whitespace() || is_delimiter(symbol) {
            break;
        }
        token.push(tokenator.next_char()?);
    }
    Ok(token)
}

fn is_delimiter(symbol: char) -> bool {
    matches!(symbol, ',' | ':' | '[' | ']' | '{' | '}' | '"')
}
