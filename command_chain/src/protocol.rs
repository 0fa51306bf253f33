//! Wire documents of the command protocol.
//!
//! The model emits `{"commands": [{"command": ..., "args": [...]}]}`; the
//! engine answers with `{"responses": [{"status": ..., "response": ...}]}`,
//! aligned by position.

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::ser::Formatter;
use thiserror::Error;

use crate::commands::CommandResult;
use crate::json_stream::JsonStreamError;

/// One executed invocation, as echoed back in the turn state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandInvocation {
    pub command: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandsDocument {
    pub commands: Vec<CommandInvocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsesDocument {
    pub responses: Vec<CommandResult>,
}

/// Model output that does not follow the command protocol.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Stream(#[from] JsonStreamError),

    #[error("missing required field '{field}' in object at position {position}")]
    MissingField {
        field: &'static str,
        position: usize,
    },

    #[error("the commands list at position {position} is empty")]
    EmptyCommands { position: usize },

    #[error("command '{command}' at position {position} requires an argument")]
    MissingArgument { command: String, position: usize },
}

impl ProtocolError {
    /// Model failure that interrupted the stream being parsed, if any.
    #[must_use]
    pub fn model_failure(&self) -> Option<&crate::model::ModelError> {
        match self {
            Self::Stream(error) => error.model_failure(),
            _ => None,
        }
    }
}

/// Serializes `value` with `", "` and `": "` separators and no other whitespace.
pub fn to_protocol_text<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let mut buffer = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buffer).map_err(|err| serde::ser::Error::custom(err.to_string()))
}

/// Renders a terminal reply in protocol form.
pub fn reply_text(reply_command: &str, content: &str) -> Result<String, serde_json::Error> {
    to_protocol_text(&CommandsDocument {
        commands: vec![CommandInvocation {
            command: reply_command.to_string(),
            args: vec![Value::String(content.to_string())],
        }],
    })
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::commands::CommandResult;
    use crate::json_stream::JsonNode;

    #[test]
    fn protocol_text_uses_spaced_separators() {
        let text = to_protocol_text(&json!({"a": [1, "x"], "b": {}})).expect("serialize");
        assert_eq!(text, r#"{"a": [1, "x"], "b": {}}"#);
    }

    #[test]
    fn responses_document_shape() {
        let document = ResponsesDocument {
            responses: vec![
                CommandResult::success("42"),
                CommandResult::error("boom"),
            ],
        };
        assert_eq!(
            to_protocol_text(&document).expect("serialize"),
            r#"{"responses": [{"status": "SUCCESS", "response": "42"}, {"status": "ERROR", "response": "boom"}]}"#
        );
    }

    #[test]
    fn reply_text_wraps_content() {
        assert_eq!(
            reply_text("reply", "Hi \"there\"").expect("serialize"),
            r#"{"commands": [{"command": "reply", "args": ["Hi \"there\""]}]}"#
        );
    }

    #[test]
    fn node_serialization_matches_protocol_text() {
        let source = r#"{"commands": [{"command": "search", "args": ["q\n", 2, null, {"k": [true]}]}]}"#;
        let node = JsonNode::parse_fragments(vec![source]).expect("root");
        let value = node.value().expect("value");
        assert_eq!(
            node.to_json_text().expect("chunks"),
            to_protocol_text(&value).expect("serialize")
        );
    }
}
