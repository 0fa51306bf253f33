//! Turn loop of the command protocol.
//!
//! One [`CommandChain::run_chat`] call answers the last user message. The
//! model's command document is parsed while it streams; commands run in
//! document order and their results are fed back as the next turn's context
//! until a terminal command answers. Protocol violations are retried a
//! bounded number of times, after which the engine asks for a plain-text
//! best-effort answer instead.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::commands::{
    Command, CommandReader, CommandRegistry, CommandResult, CommandsReader, RegistryError,
};
use crate::history::{Exchange, History, HistoryError};
use crate::io::config::ChainConfig;
use crate::io::prompt::PromptTemplates;
use crate::json_stream::{ChunkSource, JsonNode, JsonStreamError, Tokenator};
use crate::model::{GenerateOptions, Message, Model, ModelError};
use crate::protocol::{
    CommandInvocation, CommandsDocument, ProtocolError, ResponsesDocument, to_protocol_text,
};

pub mod callback;
pub mod dialogue;

pub use callback::{ChainCallback, CommandCallback, ExecutionCallback, ResultCallback};
pub use dialogue::Dialogue;

use callback::CommandOutput;

/// How a chat run produced its answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainOutcome {
    /// A terminal command answered.
    Replied,
    /// The protocol was abandoned for a plain-text answer.
    BestEffort,
}

/// Unrecoverable failure of a chat run.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error("render prompt template: {0}")]
    Template(#[from] minijinja::Error),

    #[error("serialize protocol document: {0}")]
    Serialize(#[from] serde_json::Error),
}

enum TurnError {
    Protocol(ProtocolError),
    Model(ModelError),
    Fatal(ChainError),
}

impl From<ProtocolError> for TurnError {
    fn from(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }
}

impl From<JsonStreamError> for TurnError {
    fn from(error: JsonStreamError) -> Self {
        Self::Protocol(ProtocolError::Stream(error))
    }
}

impl From<serde_json::Error> for TurnError {
    fn from(error: serde_json::Error) -> Self {
        Self::Fatal(error.into())
    }
}

impl From<RegistryError> for TurnError {
    fn from(error: RegistryError) -> Self {
        Self::Fatal(error.into())
    }
}

enum TurnStep {
    Replied,
    Continue(Exchange),
}

/// Drives a [`Model`] through the command protocol.
pub struct CommandChain<'a> {
    model: &'a dyn Model,
    registry: &'a CommandRegistry,
    templates: &'a PromptTemplates,
    max_retry_count: usize,
    max_prompt_tokens: Option<u32>,
    reply_command: String,
}

impl<'a> CommandChain<'a> {
    pub fn new(
        model: &'a dyn Model,
        registry: &'a CommandRegistry,
        templates: &'a PromptTemplates,
        config: &ChainConfig,
    ) -> Self {
        Self {
            model,
            registry,
            templates,
            max_retry_count: config.max_retry_count.max(1),
            max_prompt_tokens: config.max_prompt_tokens,
            reply_command: config.reply_command.clone(),
        }
    }

    /// System preamble listing the registered commands.
    pub fn system_preamble(&self, history: &History) -> Result<String, ChainError> {
        Ok(self.templates.render_system(
            history.system_prefix(),
            &self.registry.descriptors(),
            &self.reply_command,
        )?)
    }

    /// Answers the last user message of `history`.
    #[instrument(skip_all, fields(messages = history.messages().len()))]
    pub fn run_chat(
        &self,
        history: History,
        callback: &mut dyn ChainCallback,
    ) -> Result<ChainOutcome, ChainError> {
        let history = self.trim(history, callback)?;
        let preamble = self.system_preamble(&history)?;
        let protocol = history.protocol_messages(&preamble, &self.reply_command)?;

        let mut dialogue = Dialogue::new();
        match self.run_turns(&protocol, &mut dialogue, callback) {
            Ok(()) => Ok(ChainOutcome::Replied),
            Err(TurnError::Protocol(error)) => {
                self.best_effort(&history, &error.to_string(), &dialogue, callback)
            }
            Err(TurnError::Model(error)) if error.is_context_overflow() && !dialogue.is_empty() => {
                warn!(%error, exchanges = dialogue.len(), "context overflow mid-turn");
                callback.on_error("Context overflow", &error.to_string());
                dialogue.pop();
                self.best_effort(&history, &error.to_string(), &dialogue, callback)
            }
            Err(TurnError::Model(error)) => Err(error.into()),
            Err(TurnError::Fatal(error)) => Err(error),
        }
    }

    /// Probes the model for how many leading messages exceed the budget.
    fn trim(
        &self,
        history: History,
        callback: &mut dyn ChainCallback,
    ) -> Result<History, ChainError> {
        let Some(max_prompt_tokens) = self.max_prompt_tokens else {
            return Ok(history);
        };
        let preamble = self.system_preamble(&history)?;
        let messages = history.protocol_messages(&preamble, &self.reply_command)?;
        let probe = self.model.generate(
            &messages,
            &GenerateOptions {
                max_tokens: Some(1),
                max_prompt_tokens: Some(max_prompt_tokens),
            },
        )?;
        let discarded = probe.discarded_messages.unwrap_or(0);
        if discarded == 0 {
            return Ok(history);
        }
        let (trimmed, removed) = history.trim(discarded)?;
        info!(discarded, removed, "trimmed history to fit the prompt budget");
        callback.on_discarded_messages(removed);
        Ok(trimmed)
    }

    #[instrument(skip_all)]
    fn run_turns(
        &self,
        protocol: &[Message],
        dialogue: &mut Dialogue,
        callback: &mut dyn ChainCallback,
    ) -> Result<(), TurnError> {
        loop {
            match self.run_with_retries(protocol, dialogue, callback)? {
                TurnStep::Replied => {
                    info!(turns = dialogue.len() + 1, "turn answered");
                    return Ok(());
                }
                TurnStep::Continue(exchange) => {
                    callback.on_state(&exchange.request, &exchange.response);
                    dialogue.append(exchange.request, exchange.response);
                    info!(turns = dialogue.len(), "turn completed");
                }
            }
        }
    }

    fn run_with_retries(
        &self,
        protocol: &[Message],
        dialogue: &Dialogue,
        callback: &mut dyn ChainCallback,
    ) -> Result<TurnStep, TurnError> {
        let mut retries = Dialogue::new();
        let mut last_error: Option<ProtocolError> = None;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut messages = protocol.to_vec();
            messages.extend(dialogue.messages());
            messages.extend(retries.messages());

            let completion = match self.model.generate(&messages, &GenerateOptions::default()) {
                Ok(completion) => completion,
                Err(error) => return Err(model_failure(error, last_error, callback)),
            };
            let stream = RecordedStream::new(completion.chunks);
            let error = match self.run_turn(stream.clone(), callback) {
                Ok(step) => return Ok(step),
                Err(TurnError::Protocol(error)) => error,
                Err(other) => return Err(other),
            };
            if let Some(failure) = error.model_failure() {
                return Err(model_failure(failure.clone(), last_error, callback));
            }

            warn!(attempt, %error, "model output violates the command protocol");
            callback.on_error(&format!("Error {attempt}"), &error.to_string());
            if attempt >= self.max_retry_count {
                return Err(TurnError::Protocol(error));
            }
            retries.append(stream.drain(), retry_prompt(&error));
            last_error = Some(error);
        }
    }

    fn run_turn(
        &self,
        stream: RecordedStream,
        callback: &mut dyn ChainCallback,
    ) -> Result<TurnStep, TurnError> {
        let root = JsonNode::parse(Tokenator::new(stream))?;
        let mut commands = CommandsReader::new(&root)?;
        let mut invocations = Vec::new();
        let mut results = Vec::new();

        for command in commands.by_ref() {
            let command = command?;
            let name = command.parse_name()?;
            let executable = self.registry.create(&name)?;
            if executable.is_terminal() {
                if !results.is_empty() {
                    debug!(command = %name, "terminal command after other commands, skipping");
                    continue;
                }
                stream_reply(&name, &command, callback)?;
                return Ok(TurnStep::Replied);
            }
            debug!(command = %name, "executing command");
            let (invocation, result) = execute(executable.as_ref(), name, &command, callback)?;
            invocations.push(invocation);
            results.push(result);
        }

        if results.is_empty() {
            return Err(ProtocolError::EmptyCommands {
                position: commands.commands_position().unwrap_or(root.char_position()),
            }
            .into());
        }
        let request = to_protocol_text(&CommandsDocument {
            commands: invocations,
        })?;
        let response = to_protocol_text(&ResponsesDocument { responses: results })?;
        Ok(TurnStep::Continue(Exchange { request, response }))
    }

    #[instrument(skip_all)]
    fn best_effort(
        &self,
        history: &History,
        error: &str,
        dialogue: &Dialogue,
        callback: &mut dyn ChainCallback,
    ) -> Result<ChainOutcome, ChainError> {
        warn!(exchanges = dialogue.len(), "falling back to a best-effort answer");
        let prompt = self.templates.render_best_effort(
            history.last_user_content(),
            error,
            &dialogue.messages(),
        )?;
        let messages = history.best_effort_messages(&prompt);
        let completion = self.model.generate(&messages, &GenerateOptions::default())?;

        let mut sink = callback.result_callback();
        sink.on_start();
        for chunk in completion.chunks {
            sink.on_result(&chunk?);
        }
        sink.on_end();
        Ok(ChainOutcome::BestEffort)
    }
}

/// Streams the first argument of a terminal command to the result sink.
fn stream_reply(
    name: &str,
    command: &CommandReader,
    callback: &mut dyn ChainCallback,
) -> Result<(), TurnError> {
    let argument = command
        .parse_args()?
        .next()
        .transpose()?
        .ok_or_else(|| ProtocolError::MissingArgument {
            command: name.to_string(),
            position: command.char_position(),
        })?;
    let text = argument.as_string()?;

    let mut sink = callback.result_callback();
    sink.on_start();
    while let Some(chunk) = text.read_chunk()? {
        if !chunk.is_empty() {
            sink.on_result(&chunk);
        }
    }
    sink.on_end();
    Ok(())
}

/// Runs one non-terminal command, reporting its arguments and output.
///
/// Command failures become `ERROR` results; only stream errors abort.
fn execute(
    command: &dyn Command,
    name: String,
    reader: &CommandReader,
    callback: &mut dyn ChainCallback,
) -> Result<(CommandInvocation, CommandResult), TurnError> {
    let mut sink = callback.command_callback();
    sink.on_command(&name);
    sink.on_args_start();
    let mut args = Vec::new();
    for argument in reader.parse_args()? {
        let argument = argument?;
        sink.on_arg_start();
        for chunk in argument.chunks() {
            sink.on_arg(&chunk?);
        }
        sink.on_arg_end();
        args.push(argument.value()?);
    }
    sink.on_args_end();

    let mut output = CommandOutput {
        callback: &mut *sink,
    };
    let result = match command.execute(&args, &mut output) {
        Ok(value) => CommandResult::from_output(value),
        Err(error) => {
            warn!(command = %name, %error, "command failed");
            CommandResult::error(error.to_string())
        }
    };
    sink.on_result(&result);
    Ok((CommandInvocation { command: name, args }, result))
}

/// Overflow caused by retry padding reports and yields the protocol error
/// that caused the retry instead.
fn model_failure(
    error: ModelError,
    last_error: Option<ProtocolError>,
    callback: &mut dyn ChainCallback,
) -> TurnError {
    match last_error {
        Some(protocol_error) if error.is_context_overflow() => {
            warn!(%error, "context overflow while retrying");
            callback.on_error("Context overflow", &error.to_string());
            TurnError::Protocol(protocol_error)
        }
        _ => TurnError::Model(error),
    }
}

fn retry_prompt(error: &ProtocolError) -> String {
    format!(
        "Error: {error}\nRespond with a single JSON object of the form \
         {{\"commands\": [{{\"command\": <name>, \"args\": [<argument>, ...]}}]}}."
    )
}

struct Recording {
    source: ChunkSource,
    text: String,
}

/// Chunk source that keeps a copy of every fragment it hands out.
#[derive(Clone)]
struct RecordedStream(Rc<RefCell<Recording>>);

impl RecordedStream {
    fn new(source: ChunkSource) -> Self {
        Self(Rc::new(RefCell::new(Recording {
            source,
            text: String::new(),
        })))
    }

    /// Pulls the rest of the source and returns all text received.
    fn drain(&self) -> String {
        let mut recording = self.0.borrow_mut();
        while let Some(Ok(fragment)) = recording.source.next() {
            recording.text.push_str(&fragment);
        }
        recording.text.clone()
    }
}

impl Iterator for RecordedStream {
    type Item = Result<String, ModelError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut recording = self.0.borrow_mut();
        let item = recording.source.next();
        if let Some(Ok(fragment)) = &item {
            recording.text.push_str(fragment);
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_stream_keeps_consumed_and_drained_text() {
        let source: ChunkSource = Box::new(
            vec!["{\"a\"", ": 1", "}"]
                .into_iter()
                .map(|fragment| Ok::<String, ModelError>(fragment.to_string())),
        );
        let stream = RecordedStream::new(source);
        let mut reader = stream.clone();
        assert_eq!(reader.next(), Some(Ok("{\"a\"".to_string())));
        assert_eq!(stream.drain(), "{\"a\": 1}");
    }

    #[test]
    fn retry_prompt_names_the_error() {
        let prompt = retry_prompt(&ProtocolError::EmptyCommands { position: 13 });
        assert!(prompt.starts_with("Error: the commands list at position 13 is empty\n"));
        assert!(prompt.contains("{\"commands\": [{\"command\": <name>"));
    }
}
