//! Executable commands and the name-to-factory registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::chain::callback::ExecutionCallback;

pub mod echo;
pub mod reader;
pub mod reply;

pub use echo::Echo;
pub use reader::{ArgsReader, CommandReader, CommandsReader};
pub use reply::Reply;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Success,
    Error,
}

/// Outcome of one command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub status: Status,
    pub response: String,
}

impl CommandResult {
    pub fn success(response: impl Into<String>) -> Self {
        Self {
            status: Status::Success,
            response: response.into(),
        }
    }

    pub fn error(response: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            response: response.into(),
        }
    }

    /// Text results are used verbatim; structured results are rendered as JSON.
    #[must_use]
    pub fn from_output(output: Value) -> Self {
        match output {
            Value::String(text) => Self::success(text),
            other => Self::success(other.to_string()),
        }
    }
}

/// Failure raised by an individual command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Model-invocable action.
pub trait Command {
    /// Name the model uses to invoke the command.
    fn name(&self) -> &str;

    /// One-line description listed in the system preamble.
    fn description(&self) -> &str {
        ""
    }

    /// Terminal commands end the turn with a user-facing answer.
    fn is_terminal(&self) -> bool {
        false
    }

    /// Runs the command. Incremental output may be written to `output`.
    fn execute(
        &self,
        args: &[Value],
        output: &mut dyn ExecutionCallback,
    ) -> Result<Value, CommandError>;
}

/// Zero-argument constructor producing a fresh command instance.
pub type CommandFactory = Box<dyn Fn() -> Box<dyn Command> + Send + Sync>;

/// Name and description of a registered command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub description: String,
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("command name must not be empty")]
    EmptyName,

    #[error("command '{0}' is already registered")]
    Duplicate(String),

    #[error("factory registered as '{registered}' builds a command named '{built}'")]
    NameMismatch { registered: String, built: String },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

/// Maps command names to factories.
///
/// Names are validated when registered; the factory is invoked once so a
/// misnamed command is rejected before any chat starts.
#[derive(Default)]
pub struct CommandRegistry {
    factories: BTreeMap<String, CommandFactory>,
}

impl CommandRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.factories.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        let built = factory();
        if built.name() != name {
            return Err(RegistryError::NameMismatch {
                registered: name,
                built: built.name().to_string(),
            });
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    /// Builder-style [`CommandRegistry::register`].
    pub fn with<F>(mut self, name: impl Into<String>, factory: F) -> Result<Self, RegistryError>
    where
        F: Fn() -> Box<dyn Command> + Send + Sync + 'static,
    {
        self.register(name, factory)?;
        Ok(self)
    }

    /// Builds a fresh instance of the named command.
    pub fn create(&self, name: &str) -> Result<Box<dyn Command>, RegistryError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_string()))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered commands in name order.
    #[must_use]
    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        self.factories
            .values()
            .map(|factory| {
                let command = factory();
                CommandDescriptor {
                    name: command.name().to_string(),
                    description: command.description().to_string(),
                    terminal: command.is_terminal(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::chain::callback::ExecutionCallback;

    struct Named(&'static str);

    impl Command for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(
            &self,
            _args: &[Value],
            _output: &mut dyn ExecutionCallback,
        ) -> Result<Value, CommandError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn register_rejects_duplicates_and_empty_names() {
        let mut registry = CommandRegistry::new();
        registry
            .register("search", || Box::new(Named("search")))
            .expect("register");
        assert_eq!(
            registry.register("search", || Box::new(Named("search"))),
            Err(RegistryError::Duplicate("search".to_string()))
        );
        assert_eq!(
            registry.register("  ", || Box::new(Named("  "))),
            Err(RegistryError::EmptyName)
        );
    }

    #[test]
    fn register_rejects_misnamed_factories() {
        let error = CommandRegistry::new()
            .with("search", || Box::new(Named("lookup")))
            .err()
            .expect("mismatch");
        assert_eq!(
            error,
            RegistryError::NameMismatch {
                registered: "search".to_string(),
                built: "lookup".to_string(),
            }
        );
    }

    #[test]
    fn create_unknown_command_fails() {
        let registry = CommandRegistry::new();
        assert_eq!(
            registry.create("missing").err(),
            Some(RegistryError::UnknownCommand("missing".to_string()))
        );
    }

    #[test]
    fn descriptors_are_sorted_and_tag_terminal_commands() {
        let registry = CommandRegistry::new()
            .with("search", || Box::new(Named("search")))
            .and_then(|registry| registry.with("reply", || Box::new(Reply::new("reply"))))
            .expect("registry");
        let names: Vec<(String, bool)> = registry
            .descriptors()
            .into_iter()
            .map(|descriptor| (descriptor.name, descriptor.terminal))
            .collect();
        assert_eq!(
            names,
            vec![("reply".to_string(), true), ("search".to_string(), false)]
        );
    }

    #[test]
    fn structured_output_is_rendered_as_json() {
        assert_eq!(
            CommandResult::from_output(json!({"n": 1})),
            CommandResult::success(r#"{"n":1}"#)
        );
        assert_eq!(
            CommandResult::from_output(json!("plain")),
            CommandResult::success("plain")
        );
    }
}
