//! Streaming command-protocol engine for chat models.
//!
//! The model answers with a JSON command document that is parsed while it is
//! still being generated. The crate is split the same way throughout:
//!
//! - **[`json_stream`]**: Incremental pull-based JSON parser. Pure, no I/O.
//! - **[`commands`]** / **[`protocol`]**: Command contract, registry, and the
//!   wire documents exchanged with the model.
//! - **[`chain`]**: Turn loop with retry, best-effort degrade, and history trim.
//! - **[`io`]**: Side-effecting concerns (config files, prompt templates).
//!
//! Model transport stays behind the [`model::Model`] trait; [`scripted`]
//! replays recorded responses for the CLI and tests.

pub mod chain;
pub mod commands;
pub mod history;
pub mod io;
pub mod json_stream;
pub mod logging;
pub mod model;
pub mod protocol;
pub mod scripted;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
