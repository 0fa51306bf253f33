//! Test-only helpers for driving the chain engine.

use serde_json::Value;

use crate::chain::{ChainCallback, CommandCallback, ExecutionCallback, ResultCallback};
use crate::commands::{Command, CommandError, CommandRegistry, CommandResult, Echo, Reply};
use crate::history::{ConversationMessage, History};
use crate::model::Role;

/// Split `text` into fragments of at most `size` characters.
pub fn split_fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

/// Split `text` into fragments whose sizes cycle through `sizes`.
pub fn split_cycling(text: &str, sizes: &[usize]) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut index = 0;
    while start < chars.len() {
        let size = sizes.get(index % sizes.len().max(1)).copied().unwrap_or(1).max(1);
        let end = (start + size).min(chars.len());
        fragments.push(chars[start..end].iter().collect());
        start = end;
        index += 1;
    }
    fragments
}

/// History of a system message followed by one user message.
pub fn history(system: &str, user: &str) -> History {
    History::from_conversation(&[
        ConversationMessage::new(Role::System, system),
        ConversationMessage::new(Role::User, user),
    ])
    .expect("valid conversation")
}

/// Registry with `reply`, `echo` and `fail`.
pub fn registry() -> CommandRegistry {
    CommandRegistry::new()
        .with("reply", || Box::new(Reply::new("reply")))
        .and_then(|registry| registry.with("echo", || Box::new(Echo)))
        .and_then(|registry| registry.with("fail", || Box::new(FailingCommand)))
        .expect("valid registry")
}

/// Command that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCommand;

impl Command for FailingCommand {
    fn name(&self) -> &str {
        "fail"
    }

    fn execute(
        &self,
        _args: &[Value],
        output: &mut dyn ExecutionCallback,
    ) -> Result<Value, CommandError> {
        output.on_output("about to fail");
        Err(CommandError::Failed("boom".to_string()))
    }
}

/// Callback event, in the order it was reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(String),
    ArgsStart,
    ArgStart,
    Arg(String),
    ArgEnd,
    ArgsEnd,
    Output(String),
    CommandResult(CommandResult),
    ResultStart,
    Result(String),
    ResultEnd,
    State { request: String, response: String },
    Error { title: String, message: String },
    Discarded(usize),
}

/// Records every callback event.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    pub events: Vec<Event>,
}

impl RecordingCallback {
    /// Concatenated result chunks.
    pub fn result_text(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Result(chunk) => Some(chunk.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn result_chunks(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Result(chunk) => Some(chunk.clone()),
                _ => None,
            })
            .collect()
    }

    /// `(title, message)` of each reported error.
    pub fn errors(&self) -> Vec<(String, String)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Error { title, message } => Some((title.clone(), message.clone())),
                _ => None,
            })
            .collect()
    }

    /// `(request, response)` of each reported turn state.
    pub fn states(&self) -> Vec<(String, String)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::State { request, response } => Some((request.clone(), response.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Command(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

struct Sink<'a> {
    events: &'a mut Vec<Event>,
}

impl CommandCallback for Sink<'_> {
    fn on_command(&mut self, name: &str) {
        self.events.push(Event::Command(name.to_string()));
    }

    fn on_args_start(&mut self) {
        self.events.push(Event::ArgsStart);
    }

    fn on_arg_start(&mut self) {
        self.events.push(Event::ArgStart);
    }

    fn on_arg(&mut self, chunk: &str) {
        self.events.push(Event::Arg(chunk.to_string()));
    }

    fn on_arg_end(&mut self) {
        self.events.push(Event::ArgEnd);
    }

    fn on_args_end(&mut self) {
        self.events.push(Event::ArgsEnd);
    }

    fn on_output(&mut self, chunk: &str) {
        self.events.push(Event::Output(chunk.to_string()));
    }

    fn on_result(&mut self, result: &CommandResult) {
        self.events.push(Event::CommandResult(result.clone()));
    }
}

impl ResultCallback for Sink<'_> {
    fn on_start(&mut self) {
        self.events.push(Event::ResultStart);
    }

    fn on_result(&mut self, chunk: &str) {
        self.events.push(Event::Result(chunk.to_string()));
    }

    fn on_end(&mut self) {
        self.events.push(Event::ResultEnd);
    }
}

impl ChainCallback for RecordingCallback {
    fn command_callback(&mut self) -> Box<dyn CommandCallback + '_> {
        Box::new(Sink {
            events: &mut self.events,
        })
    }

    fn result_callback(&mut self) -> Box<dyn ResultCallback + '_> {
        Box::new(Sink {
            events: &mut self.events,
        })
    }

    fn on_state(&mut self, request: &str, response: &str) {
        self.events.push(Event::State {
            request: request.to_string(),
            response: response.to_string(),
        });
    }

    fn on_error(&mut self, title: &str, error: &str) {
        self.events.push(Event::Error {
            title: title.to_string(),
            message: error.to_string(),
        });
    }

    fn on_discarded_messages(&mut self, count: usize) {
        self.events.push(Event::Discarded(count));
    }
}
