//! Model that replays pre-recorded responses.
//!
//! Used by the `replay` CLI and by tests. Responses are consumed in order;
//! budget probes (`max_tokens == Some(1)`) are answered from
//! [`Script::probe_discarded`] without consuming a response.

use std::cell::RefCell;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Completion, GenerateOptions, Message, Model, ModelError};

/// One scripted completion.
///
/// With no fragments, `error` is returned before streaming starts; otherwise
/// it is raised after the last fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedResponse {
    #[serde(default)]
    pub fragments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ModelError>,
}

impl ScriptedResponse {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            error: None,
        }
    }

    pub fn error(error: ModelError) -> Self {
        Self {
            fragments: Vec::new(),
            error: Some(error),
        }
    }

    #[must_use]
    pub fn then_fail(mut self, error: ModelError) -> Self {
        self.error = Some(error);
        self
    }
}

/// Script file contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    /// Leading messages reported as discarded by budget probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_discarded: Option<usize>,
    #[serde(default)]
    pub responses: Vec<ScriptedResponse>,
}

/// A request received by [`ScriptedModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub options: GenerateOptions,
}

impl RecordedRequest {
    #[must_use]
    pub fn is_probe(&self) -> bool {
        self.options.max_tokens == Some(1)
    }
}

#[derive(Debug, Default)]
pub struct ScriptedModel {
    probe_discarded: Option<usize>,
    responses: RefCell<VecDeque<ScriptedResponse>>,
    requests: RefCell<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(script: Script) -> Self {
        Self {
            probe_discarded: script.probe_discarded,
            responses: RefCell::new(script.responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn respond<I, S>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(ScriptedResponse::fragments(fragments))
    }

    #[must_use]
    pub fn fail(self, error: ModelError) -> Self {
        self.push(ScriptedResponse::error(error))
    }

    #[must_use]
    pub fn push(self, response: ScriptedResponse) -> Self {
        self.responses.borrow_mut().push_back(response);
        self
    }

    #[must_use]
    pub fn with_probe_discarded(mut self, count: usize) -> Self {
        self.probe_discarded = Some(count);
        self
    }

    /// Every request received so far, probes included.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.borrow().clone()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.responses.borrow().len()
    }
}

impl Model for ScriptedModel {
    fn generate(
        &self,
        messages: &[Message],
        options: &GenerateOptions,
    ) -> Result<Completion, ModelError> {
        let request = RecordedRequest {
            messages: messages.to_vec(),
            options: *options,
        };
        let probe = request.is_probe();
        self.requests.borrow_mut().push(request);

        if probe {
            let completion = Completion::new(std::iter::empty());
            return Ok(match self.probe_discarded {
                Some(count) => completion.with_discarded_messages(count),
                None => completion,
            });
        }

        let response = self
            .responses
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| ModelError::Transport {
                message: "script exhausted".to_string(),
            })?;
        debug!(
            fragments = response.fragments.len(),
            fails = response.error.is_some(),
            "replaying scripted response"
        );
        match response.error {
            Some(error) if response.fragments.is_empty() => Err(error),
            error => Ok(Completion::new(
                response
                    .fragments
                    .into_iter()
                    .map(Ok)
                    .chain(error.map(Err)),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(completion: Completion) -> Vec<Result<String, ModelError>> {
        completion.chunks.collect()
    }

    #[test]
    fn responses_are_replayed_in_order() {
        let model = ScriptedModel::default().respond(["a", "b"]).respond(["c"]);
        let first = model
            .generate(&[Message::user("hi")], &GenerateOptions::default())
            .expect("first");
        assert_eq!(drain(first), vec![Ok("a".to_string()), Ok("b".to_string())]);
        let second = model
            .generate(&[Message::user("hi")], &GenerateOptions::default())
            .expect("second");
        assert_eq!(drain(second), vec![Ok("c".to_string())]);
        assert!(model
            .generate(&[], &GenerateOptions::default())
            .is_err());
        assert_eq!(model.requests().len(), 3);
    }

    #[test]
    fn probes_do_not_consume_responses() {
        let model = ScriptedModel::default()
            .with_probe_discarded(2)
            .respond(["x"]);
        let probe = model
            .generate(
                &[],
                &GenerateOptions {
                    max_tokens: Some(1),
                    max_prompt_tokens: Some(100),
                },
            )
            .expect("probe");
        assert_eq!(probe.discarded_messages, Some(2));
        assert_eq!(model.remaining(), 1);
        assert!(model.requests()[0].is_probe());
    }

    #[test]
    fn mid_stream_failure_follows_fragments() {
        let overflow = ModelError::ContextOverflow {
            message: "full".to_string(),
        };
        let model = ScriptedModel::default()
            .push(ScriptedResponse::fragments(["{"]).then_fail(overflow.clone()));
        let completion = model
            .generate(&[], &GenerateOptions::default())
            .expect("completion");
        assert_eq!(drain(completion), vec![Ok("{".to_string()), Err(overflow)]);
    }

    #[test]
    fn script_parses_from_json() {
        let script: Script = serde_json::from_str(
            r#"{"probe_discarded": 1, "responses": [{"fragments": ["a"]}, {"error": {"kind": "rate_limited", "message": "slow"}}]}"#,
        )
        .expect("script");
        assert_eq!(script.probe_discarded, Some(1));
        assert_eq!(
            script.responses[1],
            ScriptedResponse::error(ModelError::RateLimited {
                message: "slow".to_string()
            })
        );
    }
}
