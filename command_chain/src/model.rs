//! Model-facing message types and the chat-completion contract.
//!
//! Transport and token accounting live behind [`Model`]; the engine only sees
//! a stream of text fragments and an optional discarded-message count.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::json_stream::ChunkSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-request generation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerateOptions {
    /// Upper bound on completion tokens.
    pub max_tokens: Option<u32>,
    /// Prompt budget; a model honoring it discards leading messages and
    /// reports how many in [`Completion::discarded_messages`].
    pub max_prompt_tokens: Option<u32>,
}

/// Streamed completion returned by [`Model::generate`].
pub struct Completion {
    /// Leading prompt messages the model dropped to fit `max_prompt_tokens`.
    pub discarded_messages: Option<usize>,
    pub chunks: ChunkSource,
}

impl Completion {
    pub fn new(chunks: impl Iterator<Item = Result<String, ModelError>> + 'static) -> Self {
        Self {
            discarded_messages: None,
            chunks: Box::new(chunks),
        }
    }

    #[must_use]
    pub fn with_discarded_messages(mut self, count: usize) -> Self {
        self.discarded_messages = Some(count);
        self
    }
}

/// Upstream model failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelError {
    #[error("context length exceeded: {message}")]
    ContextOverflow { message: String },

    #[error("rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("model request failed: {message}")]
    Transport { message: String },
}

impl ModelError {
    #[must_use]
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, Self::ContextOverflow { .. })
    }
}

/// Chat-completion capability consumed by the engine.
pub trait Model {
    /// Starts a streamed completion for `messages`.
    ///
    /// Errors detected before streaming begins are returned directly; errors
    /// after that surface as items of [`Completion::chunks`].
    fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Completion, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        let message = Message::assistant("hi");
        let text = serde_json::to_string(&message).expect("serialize");
        assert_eq!(text, r#"{"role":"assistant","content":"hi"}"#);
    }

    #[test]
    fn only_overflow_counts_as_context_overflow() {
        assert!(
            ModelError::ContextOverflow {
                message: "too long".to_string()
            }
            .is_context_overflow()
        );
        assert!(
            !ModelError::RateLimited {
                message: "slow down".to_string()
            }
            .is_context_overflow()
        );
    }

    #[test]
    fn errors_deserialize_from_tagged_json() {
        let error: ModelError =
            serde_json::from_str(r#"{"kind": "context_overflow", "message": "4097 > 4096"}"#)
                .expect("deserialize");
        assert_eq!(
            error,
            ModelError::ContextOverflow {
                message: "4097 > 4096".to_string()
            }
        );
    }
}
