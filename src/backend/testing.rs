//! Scripted in-memory backend for tests.

use super::AnalysisBackend;
use crate::error::{BackendError, FailureKind};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted response.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Fail(FailureKind),
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn text(s: &str) -> Self {
        Reply::Text(s.to_string())
    }

    pub fn fail(kind: FailureKind) -> Self {
        Reply::Fail(kind)
    }

    /// Wait `delay` before answering.
    pub fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }

    /// Never answers within any sane test timeout.
    pub fn hang() -> Self {
        Reply::text("too late").after(Duration::from_secs(24 * 3600))
    }
}

struct Rule {
    marker: String,
    replies: Vec<Reply>,
    served: usize,
}

/// Answers prompts by the first rule whose marker the prompt contains.
///
/// A rule with several replies serves them in order and then repeats the
/// last one.
#[derive(Default)]
pub struct ScriptedBackend {
    rules: Mutex<Vec<Rule>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, marker: &str, reply: Reply) -> Self {
        self.rules
            .lock()
            .unwrap()
            .push(Rule {
                marker: marker.to_string(),
                replies: vec![reply],
                served: 0,
            });
        self
    }

    /// Append a follow-up reply to the rule for `marker`.
    pub fn then(self, marker: &str, reply: Reply) -> Self {
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.marker == marker) {
                Some(rule) => rule.replies.push(reply),
                None => rules.push(Rule {
                    marker: marker.to_string(),
                    replies: vec![reply],
                    served: 0,
                }),
            }
        }
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn calls_matching(&self, marker: &str) -> usize {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.contains(marker))
            .count()
    }

    fn next_reply(&self, prompt: &str) -> Option<Reply> {
        let mut rules = self.rules.lock().unwrap();
        let rule = rules.iter_mut().find(|r| prompt.contains(&r.marker))?;
        let idx = rule.served.min(rule.replies.len() - 1);
        rule.served += 1;
        Some(rule.replies[idx].clone())
    }
}

#[async_trait]
impl AnalysisBackend for ScriptedBackend {
    fn label(&self) -> String {
        "scripted/test".to_string()
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let mut reply = self
            .next_reply(prompt)
            .ok_or_else(|| BackendError::unknown("no scripted reply"))?;

        loop {
            match reply {
                Reply::Text(text) => return Ok(text),
                Reply::Fail(kind) => return Err(BackendError::new(kind, "scripted failure")),
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
            }
        }
    }
}
