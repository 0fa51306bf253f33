//! Built-in command that returns its arguments.

use serde_json::Value;

use crate::chain::callback::ExecutionCallback;
use crate::commands::{Command, CommandError};

/// Joins its arguments with spaces. Strings are used verbatim, other values
/// as compact JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Command for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Return the arguments unchanged."
    }

    fn execute(
        &self,
        args: &[Value],
        output: &mut dyn ExecutionCallback,
    ) -> Result<Value, CommandError> {
        let mut text = String::new();
        for (index, arg) in args.iter().enumerate() {
            let part = match arg {
                Value::String(part) => part.clone(),
                other => other.to_string(),
            };
            if index > 0 {
                text.push(' ');
                output.on_output(" ");
            }
            output.on_output(&part);
            text.push_str(&part);
        }
        Ok(Value::String(text))
    }
}
