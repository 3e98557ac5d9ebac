//! Error taxonomy for pipeline stages and session operations.
//!
//! Stage errors never reach the customer. The orchestrator maps every
//! [`StageError`] to an ESCALATE decision with an internal-error tag, and
//! [`FailureKind`] lets callers classify a failure without string matching.
//!
//! | Kind             | Source                                   |
//! |------------------|------------------------------------------|
//! | Malformed        | capability output failed strict decode   |
//! | Timeout          | remote stage exceeded its budget         |
//! | Remote           | transport or backend error               |
//! | PolicyViolation  | composed text broke a customer-facing rule |

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionId, SessionState};

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analysis,
    Retrieval,
    Evaluation,
    Composition,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analysis => write!(f, "analysis"),
            Self::Retrieval => write!(f, "retrieval"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Composition => write!(f, "composition"),
        }
    }
}

/// Coarse classification of a [`StageError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Malformed,
    Timeout,
    Remote,
    PolicyViolation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Remote => write!(f, "remote"),
            Self::PolicyViolation => write!(f, "policy_violation"),
        }
    }
}

/// Failure of a single pipeline stage within one turn.
#[derive(Debug, Error)]
pub enum StageError {
    /// Capability output could not be decoded into the stage contract,
    /// even after one marker-stripping retry.
    #[error("{stage}: malformed output: {detail}")]
    MalformedOutput { stage: Stage, detail: String },

    /// Remote call exceeded the stage timeout. Never retried within a turn.
    #[error("{stage}: timed out after {}s", .after.as_secs_f64())]
    RemoteTimeout { stage: Stage, after: Duration },

    /// Transport or backend failure reported by the capability.
    #[error("{stage}: remote failure: {message}")]
    Remote { stage: Stage, message: String },

    /// Output decoded but violates a customer-facing rule.
    #[error("{stage}: policy violation: {detail}")]
    PolicyViolation { stage: Stage, detail: String },
}

impl StageError {
    pub fn malformed(stage: Stage, detail: impl Into<String>) -> Self {
        Self::MalformedOutput {
            stage,
            detail: detail.into(),
        }
    }

    pub fn remote(stage: Stage, err: impl fmt::Display) -> Self {
        Self::Remote {
            stage,
            message: err.to_string(),
        }
    }

    pub fn policy(stage: Stage, detail: impl Into<String>) -> Self {
        Self::PolicyViolation {
            stage,
            detail: detail.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::MalformedOutput { stage, .. }
            | Self::RemoteTimeout { stage, .. }
            | Self::Remote { stage, .. }
            | Self::PolicyViolation { stage, .. } => *stage,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MalformedOutput { .. } => FailureKind::Malformed,
            Self::RemoteTimeout { .. } => FailureKind::Timeout,
            Self::Remote { .. } => FailureKind::Remote,
            Self::PolicyViolation { .. } => FailureKind::PolicyViolation,
        }
    }
}

/// Rejected session operation. Raised at the boundary, never turned into a decision.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    /// Feedback for a terminal session, or for one not awaiting feedback.
    #[error("session {id} is {state}, expected {expected}")]
    InvalidSessionState {
        id: SessionId,
        state: SessionState,
        expected: SessionState,
    },

    #[error("illegal session transition: {from} → {to}")]
    IllegalTransition { from: SessionState, to: SessionState },
}

/// Decision policy configuration rejected by validation.
#[derive(Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("answer_threshold must be in (0, 1], got {0}")]
    AnswerThreshold(f64),

    #[error("refuse_threshold must be in [answer_threshold, 1], got {refuse} (answer {answer})")]
    RefuseThreshold { answer: f64, refuse: f64 },

    #[error("max_turns must be at least 1")]
    ZeroTurns,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_and_kind_classify_without_strings() {
        let err = StageError::RemoteTimeout {
            stage: Stage::Retrieval,
            after: Duration::from_secs(15),
        };
        assert_eq!(err.stage(), Stage::Retrieval);
        assert_eq!(err.kind(), FailureKind::Timeout);
        assert_eq!(err.to_string(), "retrieval: timed out after 15s");
    }

    #[test]
    fn remote_wraps_display() {
        let err = StageError::remote(Stage::Analysis, "connection refused");
        assert_eq!(err.kind(), FailureKind::Remote);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn malformed_and_policy_constructors() {
        assert_eq!(
            StageError::malformed(Stage::Evaluation, "missing field").kind(),
            FailureKind::Malformed
        );
        let err = StageError::policy(Stage::Composition, "self disclosure");
        assert_eq!(err.stage(), Stage::Composition);
        assert_eq!(err.kind(), FailureKind::PolicyViolation);
    }
}
