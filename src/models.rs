//! Data models for the diagnostic panel.
//!
//! This module contains the core data structures that flow through the
//! pipeline: the input document, per-specialist outcomes, and the final
//! synthesized result.

use crate::error::{BackendError, FailureKind, PipelineError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// The medical report under analysis. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    id: Option<String>,
    text: String,
}

impl Document {
    /// Creates a document, rejecting empty or whitespace-only text.
    pub fn new(text: impl Into<String>, id: Option<String>) -> Result<Self, PipelineError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(PipelineError::input(match &id {
                Some(id) => format!("medical report '{}' is empty", id),
                None => "medical report is empty".to_string(),
            }));
        }
        Ok(Self { id, text })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Pipeline state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    RunningSpecialists,
    Synthesizing,
    Done,
    Failed,
}

impl PipelineState {
    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Init, RunningSpecialists)
                | (RunningSpecialists, Synthesizing)
                | (RunningSpecialists, Failed)
                | (Synthesizing, Done)
                | (Synthesizing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Init => write!(f, "INIT"),
            PipelineState::RunningSpecialists => write!(f, "RUNNING_SPECIALISTS"),
            PipelineState::Synthesizing => write!(f, "SYNTHESIZING"),
            PipelineState::Done => write!(f, "DONE"),
            PipelineState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Terminal status of one specialist, carrying exactly one payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Succeeded { text: String },
    Failed { reason: BackendError },
}

/// Result of one specialist task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistOutcome {
    /// Role identifier from the roster.
    pub role: String,
    /// Human-readable role name.
    pub name: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    /// Wall-clock time spent on the task.
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl SpecialistOutcome {
    pub fn succeeded(role: &str, name: &str, text: String, elapsed: Duration) -> Self {
        Self {
            role: role.to_string(),
            name: name.to_string(),
            status: OutcomeStatus::Succeeded { text },
            elapsed,
        }
    }

    pub fn failed(role: &str, name: &str, reason: BackendError, elapsed: Duration) -> Self {
        Self {
            role: role.to_string(),
            name: name.to_string(),
            status: OutcomeStatus::Failed { reason },
            elapsed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Succeeded { .. })
    }

    /// Produced text, present iff the task succeeded.
    pub fn text(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Succeeded { text } => Some(text),
            OutcomeStatus::Failed { .. } => None,
        }
    }

    /// Failure reason, present iff the task failed.
    pub fn failure(&self) -> Option<&BackendError> {
        match &self.status {
            OutcomeStatus::Succeeded { .. } => None,
            OutcomeStatus::Failed { reason } => Some(reason),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure().map(|r| r.kind)
    }
}

/// The synthesized team assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    /// Identifier of the analyzed document, if known.
    pub document_id: Option<String>,
    /// Synthesized text from the backend.
    pub text: String,
    /// Roles whose output fed the synthesis, in roster order.
    pub contributing_roles: Vec<String>,
    /// Overall pipeline status.
    pub status: PipelineState,
    /// True when at least one specialist did not contribute.
    pub partial: bool,
    /// Label of the backend that produced the text.
    pub backend: String,
    pub completed_at: DateTime<Utc>,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_rejects_blank_text() {
        assert!(Document::new("", None).is_err());
        assert!(Document::new("   \n\t", Some("case-1".to_string())).is_err());
        let doc = Document::new("Patient reports chest pain.", Some("case-1".to_string())).unwrap();
        assert_eq!(doc.id(), Some("case-1"));
        assert_eq!(doc.text(), "Patient reports chest pain.");
    }

    #[test]
    fn test_state_transitions() {
        use PipelineState::*;
        assert!(Init.can_transition_to(RunningSpecialists));
        assert!(RunningSpecialists.can_transition_to(Synthesizing));
        assert!(RunningSpecialists.can_transition_to(Failed));
        assert!(Synthesizing.can_transition_to(Done));
        assert!(Synthesizing.can_transition_to(Failed));

        assert!(!Init.can_transition_to(Synthesizing));
        assert!(!Init.can_transition_to(Done));
        assert!(!RunningSpecialists.can_transition_to(Done));
        assert!(!Done.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(RunningSpecialists));

        assert!(Done.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!Synthesizing.is_terminal());
    }

    #[test]
    fn test_outcome_payload_exclusive() {
        let ok = SpecialistOutcome::succeeded(
            "cardiologist",
            "Cardiologist",
            "No arrhythmia".to_string(),
            Duration::from_millis(5),
        );
        assert!(ok.is_success());
        assert_eq!(ok.text(), Some("No arrhythmia"));
        assert!(ok.failure().is_none());

        let failed = SpecialistOutcome::failed(
            "cardiologist",
            "Cardiologist",
            BackendError::timeout("took too long"),
            Duration::from_secs(1),
        );
        assert!(!failed.is_success());
        assert!(failed.text().is_none());
        assert_eq!(failed.failure_kind(), Some(FailureKind::Timeout));
    }

    #[test]
    fn test_outcome_serialization() {
        let failed = SpecialistOutcome::failed(
            "psychologist",
            "Psychologist",
            BackendError::auth("401"),
            Duration::from_millis(1500),
        );
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"]["kind"], "auth");
        assert_eq!(json["elapsed"], 1500);
    }
}
