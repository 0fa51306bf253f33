//! Error taxonomy for the streaming JSON parser.

use thiserror::Error;

use crate::json_stream::node::NodeType;
use crate::json_stream::tokenator::MAX_DEPTH;
use crate::model::ModelError;

/// Failure raised while pulling JSON structure out of a chunk stream.
///
/// Every variant carries the character position (not byte offset) at which the
/// parser stood when the failure was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonStreamError {
    #[error("unexpected symbol '{symbol}' at position {position}")]
    UnexpectedSymbol { symbol: char, position: usize },

    #[error("unexpected end of stream at position {position}")]
    UnexpectedEndOfStream { position: usize },

    #[error("invalid escape sequence '\\{symbol}' at position {position}")]
    InvalidEscapeSequence { symbol: char, position: usize },

    #[error("expected {expected} but found {actual} at position {position}")]
    TypeMismatch {
        expected: NodeType,
        actual: NodeType,
        position: usize,
    },

    #[error("invalid {node_type} literal '{token}' at position {position}")]
    InvalidLiteral {
        node_type: NodeType,
        token: String,
        position: usize,
    },

    #[error("nesting deeper than {max} levels at position {position}", max = MAX_DEPTH)]
    NestingTooDeep { position: usize },

    #[error("model stream failed at position {position}: {source}")]
    Source {
        #[source]
        source: ModelError,
        position: usize,
    },
}

impl JsonStreamError {
    /// Character position at which the failure was detected.
    #[must_use]
    pub fn position(&self) -> usize {
        match self {
            Self::UnexpectedSymbol { position, .. }
            | Self::UnexpectedEndOfStream { position }
            | Self::InvalidEscapeSequence { position, .. }
            | Self::TypeMismatch { position, .. }
            | Self::InvalidLiteral { position, .. }
            | Self::NestingTooDeep { position }
            | Self::Source { position, .. } => *position,
        }
    }

    /// Upstream model failure that interrupted the stream, if any.
    #[must_use]
    pub fn model_failure(&self) -> Option<&ModelError> {
        match self {
            Self::Source { source, .. } => Some(source),
            _ => None,
        }
    }
}
