//! Terminal command that answers the user.

use serde_json::Value;

use crate::chain::callback::ExecutionCallback;
use crate::commands::{Command, CommandError};

/// Ends the turn with its first argument as the user-facing answer.
///
/// The engine streams the argument straight to the result sink instead of
/// calling [`Command::execute`]; `execute` exists for callers that run the
/// command directly.
#[derive(Debug, Clone)]
pub struct Reply {
    name: String,
}

impl Reply {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Command for Reply {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Answer the user with the text given as the only argument. Ends the turn."
    }

    fn is_terminal(&self) -> bool {
        true
    }

    /// Returns the first argument, which must be a string. Later arguments
    /// are ignored, as they are when the engine streams the reply.
    fn execute(
        &self,
        args: &[Value],
        _output: &mut dyn ExecutionCallback,
    ) -> Result<Value, CommandError> {
        match args.first() {
            Some(text @ Value::String(_)) => Ok(text.clone()),
            _ => Err(CommandError::InvalidArguments(format!(
                "{} expects a string as its first argument",
                self.name
            ))),
        }
    }
}
