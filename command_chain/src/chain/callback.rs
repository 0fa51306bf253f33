//! Reporting sinks the engine drives while a turn runs.

use crate::commands::CommandResult;

/// Receives incremental output written by a running command.
pub trait ExecutionCallback {
    fn on_output(&mut self, chunk: &str);
}

/// Per-command reporting sink.
pub trait CommandCallback {
    fn on_command(&mut self, name: &str);

    fn on_args_start(&mut self) {}

    /// Called once per argument before its chunks.
    fn on_arg_start(&mut self) {}

    /// Serialized argument text, in stream order.
    fn on_arg(&mut self, chunk: &str);

    fn on_arg_end(&mut self) {}

    fn on_args_end(&mut self) {}

    /// Incremental output of the executing command.
    fn on_output(&mut self, _chunk: &str) {}

    fn on_result(&mut self, result: &CommandResult);
}

/// Sink for the final user-facing answer.
pub trait ResultCallback {
    fn on_start(&mut self) {}

    fn on_result(&mut self, chunk: &str);

    fn on_end(&mut self) {}
}

/// Structured events of one chat run.
pub trait ChainCallback {
    fn command_callback(&mut self) -> Box<dyn CommandCallback + '_>;

    fn result_callback(&mut self) -> Box<dyn ResultCallback + '_>;

    /// One call per completed non-terminal turn, with the protocol request
    /// and response documents.
    fn on_state(&mut self, request: &str, response: &str);

    fn on_error(&mut self, title: &str, error: &str);

    /// Number of user-visible messages dropped to fit the prompt budget.
    fn on_discarded_messages(&mut self, _count: usize) {}
}

/// Forwards command output into its [`CommandCallback`].
pub(crate) struct CommandOutput<'a> {
    pub(crate) callback: &'a mut dyn CommandCallback,
}

impl ExecutionCallback for CommandOutput<'_> {
    fn on_output(&mut self, chunk: &str) {
        self.callback.on_output(chunk);
    }
}
