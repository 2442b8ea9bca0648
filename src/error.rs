//! Error types for backends and the pipeline.
//!
//! Backend failures are always classified into a [`FailureKind`] so that a
//! failed specialist outcome can say *why* it failed. Pipeline errors are the
//! run-level failures surfaced to the caller.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a single backend call failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Missing or rejected credentials.
    Auth,
    /// The provider throttled the request.
    RateLimit,
    /// The call (or the task wrapping it) exceeded its time budget.
    Timeout,
    /// The provider answered, but not with usable text.
    MalformedResponse,
    /// The caller aborted the run before the call finished.
    Cancelled,
    /// Anything else: connection refused, 5xx, unexpected status.
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Auth => write!(f, "auth"),
            FailureKind::RateLimit => write!(f, "rate_limit"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::MalformedResponse => write!(f, "malformed_response"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl FailureKind {
    /// Whether a local retry of the same call is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureKind::RateLimit | FailureKind::Timeout)
    }
}

/// A classified failure of one backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(FailureKind::RateLimit, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Cancelled, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }
}

/// Error raised while rendering a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template '{template}' has no value for placeholder {{{placeholder}}}")]
    MissingValue {
        template: String,
        placeholder: String,
    },

    #[error("template '{template}' must reference {{{placeholder}}}")]
    MissingPlaceholder {
        template: String,
        placeholder: String,
    },

    #[error("template '{template}' has an unterminated placeholder")]
    Unterminated { template: String },
}

/// A failed specialist as reported inside an aggregation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFailure {
    pub role: String,
    pub kind: FailureKind,
    pub message: String,
}

/// Run-level errors.
///
/// `Input` and `Config` are raised before any task is scheduled. The other
/// variants are terminal for a run that already started and always travel
/// together with the specialist outcomes collected so far.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("input error: {message}")]
    Input { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("no specialist produced an analysis ({} failed)", failures.len())]
    Aggregation { failures: Vec<RoleFailure> },

    #[error("synthesis failed: {source}")]
    Synthesis { source: BackendError },

    #[error("run aborted by caller after {completed} of {total} specialists finished")]
    Aborted { completed: usize, total: usize },
}

impl PipelineError {
    pub fn input(message: impl Into<String>) -> Self {
        PipelineError::Input {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        PipelineError::Config {
            message: message.into(),
        }
    }
}

impl From<TemplateError> for PipelineError {
    fn from(err: TemplateError) -> Self {
        PipelineError::config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(FailureKind::RateLimit.is_retryable());
        assert!(FailureKind::Timeout.is_retryable());
        assert!(!FailureKind::Auth.is_retryable());
        assert!(!FailureKind::MalformedResponse.is_retryable());
        assert!(!FailureKind::Cancelled.is_retryable());
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::rate_limit("429 Too Many Requests");
        assert_eq!(err.to_string(), "rate_limit: 429 Too Many Requests");
    }

    #[test]
    fn test_aggregation_error_message() {
        let err = PipelineError::Aggregation {
            failures: vec![
                RoleFailure {
                    role: "a".to_string(),
                    kind: FailureKind::Timeout,
                    message: "slow".to_string(),
                },
                RoleFailure {
                    role: "b".to_string(),
                    kind: FailureKind::Auth,
                    message: "401".to_string(),
                },
            ],
        };
        assert_eq!(
            err.to_string(),
            "no specialist produced an analysis (2 failed)"
        );
    }

    #[test]
    fn test_template_error_message() {
        let err = TemplateError::MissingPlaceholder {
            template: "cardiologist".to_string(),
            placeholder: "medical_report".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "template 'cardiologist' must reference {medical_report}"
        );
    }
}
