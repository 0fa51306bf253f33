//! Normalized, lazily produced serialization of a node tree.
//!
//! Output contains no insignificant whitespace apart from the `", "` and
//! `": "` separators, so it matches [`crate::protocol::to_protocol_text`].

use crate::json_stream::array::JsonArray;
use crate::json_stream::error::JsonStreamError;
use crate::json_stream::node::JsonNode;
use crate::json_stream::object::JsonObject;
use crate::json_stream::string::JsonString;

enum Frame {
    Start(JsonNode),
    Object { node: JsonObject, index: usize },
    Array { node: JsonArray, index: usize },
    String { node: JsonString, index: usize },
}

/// Iterator over the text chunks of a node.
///
/// Pulling a chunk may read from the underlying stream. After an error the
/// iterator is exhausted.
pub struct NodeChunks {
    stack: Vec<Frame>,
}

impl NodeChunks {
    pub(crate) fn new(node: JsonNode) -> Self {
        Self {
            stack: vec![Frame::Start(node)],
        }
    }

    fn advance(&mut self) -> Result<Option<String>, JsonStreamError> {
        while let Some(frame) = self.stack.pop() {
            match frame {
                Frame::Start(node) => match node {
                    JsonNode::Object(node) => {
                        self.stack.push(Frame::Object { node, index: 0 });
                        return Ok(Some("{".to_string()));
                    }
                    JsonNode::Array(node) => {
                        self.stack.push(Frame::Array { node, index: 0 });
                        return Ok(Some("[".to_string()));
                    }
                    JsonNode::String(node) => {
                        self.stack.push(Frame::String { node, index: 0 });
                        return Ok(Some("\"".to_string()));
                    }
                    JsonNode::Number(node) => return Ok(Some(node.value().to_string())),
                    JsonNode::Boolean(node) => return Ok(Some(node.value().to_string())),
                    JsonNode::Null(_) => return Ok(Some("null".to_string())),
                },
                Frame::Object { node, index } => {
                    let Some((key, value)) = node.entry_at(index)? else {
                        return Ok(Some("}".to_string()));
                    };
                    self.stack.push(Frame::Object {
                        node,
                        index: index + 1,
                    });
                    self.stack.push(Frame::Start(value));
                    let separator = if index > 0 { ", " } else { "" };
                    return Ok(Some(format!("{separator}\"{}\": ", escape_json_text(&key))));
                }
                Frame::Array { node, index } => {
                    let Some(item) = node.item_at(index)? else {
                        return Ok(Some("]".to_string()));
                    };
                    self.stack.push(Frame::Array {
                        node,
                        index: index + 1,
                    });
                    self.stack.push(Frame::Start(item));
                    if index > 0 {
                        return Ok(Some(", ".to_string()));
                    }
                }
                Frame::String { node, index } => {
                    let Some(segment) = node.segment_at(index)? else {
                        return Ok(Some("\"".to_string()));
                    };
                    self.stack.push(Frame::String {
                        node,
                        index: index + 1,
                    });
                    return Ok(Some(escape_json_text(&segment)));
                }
            }
        }
        Ok(None)
    }
}

impl Iterator for NodeChunks {
    type Item = Result<String, JsonStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(chunk) => chunk.map(Ok),
            Err(error) => {
                self.stack.clear();
                Some(Err(error))
            }
        }
    }
}

/// Escapes string contents the same way `serde_json` does.
pub(crate) fn escape_json_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for symbol in text.chars() {
        match symbol {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\u{8}' => escaped.push_str("\\b"),
            '\u{c}' => escaped.push_str("\\f"),
            control if u32::from(control) < 0x20 => {
                escaped.push_str(&format!("\\u{:04x}", u32::from(control)));
            }
            other => escaped.push(other),
        }
    }
    escaped
}
