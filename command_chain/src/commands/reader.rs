//! Command-document view over a streaming JSON node.
//!
//! Expected shape: `{"commands": [{"command": <string>, "args": [...]}]}`.
//! Models sometimes pass a single value instead of an `args` array; that value
//! is accepted as the sole argument.

use crate::json_stream::{JsonArray, JsonNode, JsonObject};
use crate::protocol::ProtocolError;

/// Lazy sequence of the invocations in a command document.
#[derive(Debug)]
pub struct CommandsReader {
    document: JsonObject,
    commands: Option<JsonArray>,
    done: bool,
}

impl CommandsReader {
    pub fn new(node: &JsonNode) -> Result<Self, ProtocolError> {
        Ok(Self {
            document: node.as_object()?.clone(),
            commands: None,
            done: false,
        })
    }

    /// Position of the `commands` array once it has been located.
    #[must_use]
    pub fn commands_position(&self) -> Option<usize> {
        self.commands.as_ref().map(JsonArray::char_position)
    }

    fn commands(&mut self) -> Result<JsonArray, ProtocolError> {
        if let Some(commands) = &self.commands {
            return Ok(commands.clone());
        }
        let node = self
            .document
            .get("commands")?
            .ok_or(ProtocolError::MissingField {
                field: "commands",
                position: self.document.char_position(),
            })?;
        let commands = node.as_array()?.clone();
        self.commands = Some(commands.clone());
        Ok(commands)
    }

    fn next_command(&mut self) -> Result<Option<CommandReader>, ProtocolError> {
        match self.commands()?.next_item()? {
            Some(item) => CommandReader::new(&item).map(Some),
            None => Ok(None),
        }
    }
}

impl Iterator for CommandsReader {
    type Item = Result<CommandReader, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_command() {
            Ok(Some(command)) => Some(Ok(command)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// View over one `{"command": ..., "args": ...}` entry.
#[derive(Debug, Clone)]
pub struct CommandReader {
    invocation: JsonObject,
}

impl CommandReader {
    pub fn new(node: &JsonNode) -> Result<Self, ProtocolError> {
        Ok(Self {
            invocation: node.as_object()?.clone(),
        })
    }

    #[must_use]
    pub fn char_position(&self) -> usize {
        self.invocation.char_position()
    }

    /// Reads the full command name.
    pub fn parse_name(&self) -> Result<String, ProtocolError> {
        let node = self.field("command")?;
        Ok(node.as_string()?.join()?)
    }

    /// Lazy sequence of argument nodes.
    pub fn parse_args(&self) -> Result<ArgsReader, ProtocolError> {
        let node = self.field("args")?;
        let source = match node {
            JsonNode::Array(array) => ArgsSource::Array(array),
            single => ArgsSource::Single(Some(single)),
        };
        Ok(ArgsReader {
            source,
            done: false,
        })
    }

    fn field(&self, field: &'static str) -> Result<JsonNode, ProtocolError> {
        self.invocation
            .get(field)?
            .ok_or(ProtocolError::MissingField {
                field,
                position: self.invocation.char_position(),
            })
    }
}

#[derive(Debug)]
enum ArgsSource {
    Array(JsonArray),
    Single(Option<JsonNode>),
}

/// Argument nodes of one invocation, yielded as they are parsed.
#[derive(Debug)]
pub struct ArgsReader {
    source: ArgsSource,
    done: bool,
}

impl Iterator for ArgsReader {
    type Item = Result<JsonNode, ProtocolError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = match &mut self.source {
            ArgsSource::Array(array) => array.next_item().map_err(ProtocolError::from),
            ArgsSource::Single(single) => Ok(single.take()),
        };
        match next {
            Ok(Some(node)) => Some(Ok(node)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}
