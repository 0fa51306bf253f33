//! Exchanges accumulated within one user turn.

use crate::history::Exchange;
use crate::model::Message;

/// Ordered (assistant request, user response) pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dialogue {
    exchanges: Vec<Exchange>,
}

impl Dialogue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, request: impl Into<String>, response: impl Into<String>) {
        self.exchanges.push(Exchange {
            request: request.into(),
            response: response.into(),
        });
    }

    /// Removes the most recent exchange.
    pub fn pop(&mut self) -> Option<Exchange> {
        self.exchanges.pop()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    #[must_use]
    pub fn exchanges(&self) -> &[Exchange] {
        &self.exchanges
    }

    /// Model-facing messages: an assistant request followed by a user response per exchange.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.exchanges
            .iter()
            .flat_map(|exchange| {
                [
                    Message::assistant(exchange.request.clone()),
                    Message::user(exchange.response.clone()),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_alternate_assistant_and_user() {
        let mut dialogue = Dialogue::new();
        dialogue.append("req-1", "resp-1");
        dialogue.append("req-2", "resp-2");
        assert_eq!(
            dialogue.messages(),
            vec![
                Message::assistant("req-1"),
                Message::user("resp-1"),
                Message::assistant("req-2"),
                Message::user("resp-2"),
            ]
        );
    }

    #[test]
    fn pop_removes_last_exchange() {
        let mut dialogue = Dialogue::new();
        assert!(dialogue.pop().is_none());
        dialogue.append("req", "resp");
        let exchange = dialogue.pop().expect("exchange");
        assert_eq!(exchange.request, "req");
        assert!(dialogue.is_empty());
    }
}
