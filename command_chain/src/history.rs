//! Conversation history with protocol scoping.
//!
//! USER-scope messages are the transcript the end user sees. INTERNAL-scope
//! messages are protocol exchanges (assistant request, user response) that
//! produced the assistant reply immediately following them.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::model::{Message, Role};
use crate::protocol::reply_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    User,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedMessage {
    pub scope: Scope,
    pub message: Message,
    /// Index of the conversation entry this message came from. Internal
    /// exchanges share the index of the reply they led to.
    pub user_index: usize,
}

/// One protocol round trip: the model's command document and the engine's
/// response document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub request: String,
    pub response: String,
}

/// Caller-facing conversation entry. `state` holds the exchanges that led to
/// an assistant reply in an earlier turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state: Vec<Exchange>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            state: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: Vec<Exchange>) -> Self {
        self.state = state;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HistoryError {
    #[error("conversation is empty")]
    Empty,

    #[error("conversation must end with a user message")]
    LastMessageNotUser,

    #[error("message {index} carries protocol state but is not an assistant message")]
    StateOnNonAssistant { index: usize },

    #[error("internal exchange run ending at message {index} is not followed by an assistant reply")]
    DanglingInternalRun { index: usize },

    #[error("no user messages remain after trimming")]
    EmptyAfterTrim,
}

/// Ordered scoped messages of one chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    messages: Vec<ScopedMessage>,
}

impl History {
    /// Expands each message's protocol state into INTERNAL pairs placed before it.
    pub fn from_conversation(conversation: &[ConversationMessage]) -> Result<Self, HistoryError> {
        let last = conversation.last().ok_or(HistoryError::Empty)?;
        if last.role != Role::User {
            return Err(HistoryError::LastMessageNotUser);
        }

        let mut messages = Vec::with_capacity(conversation.len());
        for (index, entry) in conversation.iter().enumerate() {
            if !entry.state.is_empty() && entry.role != Role::Assistant {
                return Err(HistoryError::StateOnNonAssistant { index });
            }
            for exchange in &entry.state {
                messages.push(ScopedMessage {
                    scope: Scope::Internal,
                    message: Message::assistant(exchange.request.clone()),
                    user_index: index,
                });
                messages.push(ScopedMessage {
                    scope: Scope::Internal,
                    message: Message::user(exchange.response.clone()),
                    user_index: index,
                });
            }
            messages.push(ScopedMessage {
                scope: Scope::User,
                message: Message {
                    role: entry.role,
                    content: entry.content.clone(),
                },
                user_index: index,
            });
        }
        Ok(Self { messages })
    }

    #[must_use]
    pub fn messages(&self) -> &[ScopedMessage] {
        &self.messages
    }

    /// Content of a leading system message, or `""`.
    #[must_use]
    pub fn system_prefix(&self) -> &str {
        match self.messages.first() {
            Some(first) if first.message.role == Role::System => &first.message.content,
            _ => "",
        }
    }

    /// Content of the most recent user-visible user message.
    #[must_use]
    pub fn last_user_content(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|scoped| scoped.scope == Scope::User && scoped.message.role == Role::User)
            .map_or("", |scoped| scoped.message.content.as_str())
    }

    /// The transcript the end user sees.
    #[must_use]
    pub fn user_messages(&self) -> Vec<Message> {
        self.messages
            .iter()
            .filter(|scoped| scoped.scope == Scope::User)
            .map(|scoped| scoped.message.clone())
            .collect()
    }

    /// Model-facing messages: `preamble` as the system message, past replies
    /// re-encoded as `reply_command` invocations, internal exchanges verbatim.
    pub fn protocol_messages(
        &self,
        preamble: &str,
        reply_command: &str,
    ) -> Result<Vec<Message>, serde_json::Error> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.push(Message::system(preamble));
        for (index, scoped) in self.messages.iter().enumerate() {
            if index == 0 && scoped.message.role == Role::System {
                continue;
            }
            match (scoped.scope, scoped.message.role) {
                (Scope::User, Role::Assistant) => messages.push(Message::assistant(reply_text(
                    reply_command,
                    &scoped.message.content,
                )?)),
                _ => messages.push(scoped.message.clone()),
            }
        }
        Ok(messages)
    }

    /// Plain transcript with the last user message replaced by `prompt`.
    #[must_use]
    pub fn best_effort_messages(&self, prompt: &str) -> Vec<Message> {
        let mut messages = self.user_messages();
        if let Some(last) = messages
            .iter_mut()
            .rev()
            .find(|message| message.role == Role::User)
        {
            last.content = prompt.to_string();
        }
        messages
    }

    /// Drops `discard` leading non-system messages.
    ///
    /// A boundary inside an INTERNAL run extends to the end of that run, which
    /// must be followed by an assistant reply. Returns the trimmed history and
    /// the number of conversation entries that no longer appear in it.
    pub fn trim(&self, discard: usize) -> Result<(Self, usize), HistoryError> {
        let mut kept = Vec::with_capacity(self.messages.len());
        let mut iter = self.messages.iter().enumerate().peekable();
        let mut skipped = 0;
        let mut skipped_entries = Vec::new();
        let mut last_skipped = None;

        while skipped < discard {
            let Some((index, scoped)) = iter.next() else {
                break;
            };
            if scoped.message.role == Role::System {
                kept.push(scoped.clone());
                continue;
            }
            skipped += 1;
            skipped_entries.push(scoped.user_index);
            last_skipped = Some((index, scoped.scope));
        }

        if let Some((mut index, Scope::Internal)) = last_skipped {
            while let Some((next, scoped)) =
                iter.next_if(|(_, scoped)| scoped.scope == Scope::Internal)
            {
                skipped_entries.push(scoped.user_index);
                index = next;
            }
            let followed_by_reply = matches!(
                iter.peek(),
                Some((_, next)) if next.scope == Scope::User && next.message.role == Role::Assistant
            );
            if !followed_by_reply {
                return Err(HistoryError::DanglingInternalRun { index });
            }
            debug!(index, "trim boundary extended past internal run");
        }

        kept.extend(iter.map(|(_, scoped)| scoped.clone()));
        let has_user = kept
            .iter()
            .any(|scoped| scoped.scope == Scope::User && scoped.message.role != Role::System);
        if !has_user {
            return Err(HistoryError::EmptyAfterTrim);
        }
        skipped_entries.dedup();
        let removed = skipped_entries
            .iter()
            .filter(|&&entry| !kept.iter().any(|scoped| scoped.user_index == entry))
            .count();
        Ok((Self { messages: kept }, removed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(request: &str, response: &str) -> Exchange {
        Exchange {
            request: request.to_string(),
            response: response.to_string(),
        }
    }

    fn sample() -> History {
        History::from_conversation(&[
            ConversationMessage::new(Role::System, "S"),
            ConversationMessage::new(Role::User, "q1"),
            ConversationMessage::new(Role::Assistant, "a1")
                .with_state(vec![exchange("req-1", "resp-1")]),
            ConversationMessage::new(Role::User, "q2"),
        ])
        .expect("history")
    }

    fn contents(history: &History) -> Vec<&str> {
        history
            .messages()
            .iter()
            .map(|scoped| scoped.message.content.as_str())
            .collect()
    }

    #[test]
    fn state_expands_into_internal_pairs_before_the_reply() {
        let history = sample();
        let scopes: Vec<_> = history.messages().iter().map(|scoped| scoped.scope).collect();
        assert_eq!(
            scopes,
            vec![
                Scope::User,
                Scope::User,
                Scope::Internal,
                Scope::Internal,
                Scope::User,
                Scope::User,
            ]
        );
        assert_eq!(contents(&history), vec!["S", "q1", "req-1", "resp-1", "a1", "q2"]);
    }

    #[test]
    fn conversation_must_end_with_user() {
        assert_eq!(History::from_conversation(&[]), Err(HistoryError::Empty));
        assert_eq!(
            History::from_conversation(&[ConversationMessage::new(Role::Assistant, "hi")]),
            Err(HistoryError::LastMessageNotUser)
        );
    }

    #[test]
    fn state_is_only_allowed_on_assistant_messages() {
        let error = History::from_conversation(&[
            ConversationMessage::new(Role::User, "q").with_state(vec![exchange("a", "b")])
        ])
        .expect_err("invalid");
        assert_eq!(error, HistoryError::StateOnNonAssistant { index: 0 });
    }

    #[test]
    fn protocol_messages_replace_system_and_encode_replies() {
        let messages = sample()
            .protocol_messages("PREAMBLE", "reply")
            .expect("messages");
        assert_eq!(
            messages,
            vec![
                Message::system("PREAMBLE"),
                Message::user("q1"),
                Message::assistant("req-1"),
                Message::user("resp-1"),
                Message::assistant(r#"{"commands": [{"command": "reply", "args": ["a1"]}]}"#),
                Message::user("q2"),
            ]
        );
    }

    #[test]
    fn internal_messages_share_the_reply_entry_index() {
        let indices: Vec<_> = sample()
            .messages()
            .iter()
            .map(|scoped| scoped.user_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 2, 2, 3]);
    }

    #[test]
    fn conversation_without_system_gets_preamble_first() {
        let history = History::from_conversation(&[
            ConversationMessage::new(Role::User, "q1"),
            ConversationMessage::new(Role::Assistant, "a1"),
            ConversationMessage::new(Role::User, "q2"),
        ])
        .expect("history");
        assert_eq!(history.system_prefix(), "");
        let messages = history
            .protocol_messages("PREAMBLE", "reply")
            .expect("messages");
        assert_eq!(
            messages,
            vec![
                Message::system("PREAMBLE"),
                Message::user("q1"),
                Message::assistant(r#"{"commands": [{"command": "reply", "args": ["a1"]}]}"#),
                Message::user("q2"),
            ]
        );
    }

    #[test]
    fn user_messages_hide_internal_exchanges() {
        assert_eq!(
            sample().user_messages(),
            vec![
                Message::system("S"),
                Message::user("q1"),
                Message::assistant("a1"),
                Message::user("q2"),
            ]
        );
    }

    #[test]
    fn best_effort_replaces_last_user_message() {
        let messages = sample().best_effort_messages("PROMPT");
        assert_eq!(messages.last(), Some(&Message::user("PROMPT")));
        assert_eq!(messages.len(), 4);
    }

    #[test]
    fn trim_keeps_system_messages_uncounted() {
        let (trimmed, discarded) = sample().trim(1).expect("trim");
        assert_eq!(contents(&trimmed), vec!["S", "req-1", "resp-1", "a1", "q2"]);
        assert_eq!(discarded, 1);
    }

    #[test]
    fn trim_inside_internal_run_extends_to_reply() {
        let (trimmed, discarded) = sample().trim(2).expect("trim");
        assert_eq!(contents(&trimmed), vec!["S", "a1", "q2"]);
        assert_eq!(discarded, 1);
    }

    #[test]
    fn trim_everything_is_fatal() {
        assert_eq!(sample().trim(6), Err(HistoryError::EmptyAfterTrim));
        assert_eq!(sample().trim(100), Err(HistoryError::EmptyAfterTrim));
    }

    #[test]
    fn internal_run_without_reply_is_an_internal_error() {
        let history = History {
            messages: vec![
                ScopedMessage {
                    scope: Scope::User,
                    message: Message::user("q1"),
                    user_index: 0,
                },
                ScopedMessage {
                    scope: Scope::Internal,
                    message: Message::assistant("req"),
                    user_index: 1,
                },
                ScopedMessage {
                    scope: Scope::Internal,
                    message: Message::user("resp"),
                    user_index: 1,
                },
                ScopedMessage {
                    scope: Scope::User,
                    message: Message::user("q2"),
                    user_index: 1,
                },
            ],
        };
        assert_eq!(
            history.trim(2),
            Err(HistoryError::DanglingInternalRun { index: 2 })
        );
    }

    #[test]
    fn trim_counts_entries_not_messages() {
        let history = History::from_conversation(&[
            ConversationMessage::new(Role::User, "q1"),
            ConversationMessage::new(Role::Assistant, "a1")
                .with_state(vec![exchange("req-1", "resp-1"), exchange("req-2", "resp-2")]),
            ConversationMessage::new(Role::User, "q2"),
        ])
        .expect("history");
        let (trimmed, removed) = history.trim(3).expect("trim");
        assert_eq!(contents(&trimmed), vec!["a1", "q2"]);
        assert_eq!(removed, 1);
    }

    #[test]
    fn zero_discard_is_identity() {
        let history = sample();
        let (trimmed, discarded) = history.trim(0).expect("trim");
        assert_eq!(trimmed, history);
        assert_eq!(discarded, 0);
    }
}
