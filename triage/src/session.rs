//! Multi-turn session state machine.
//!
//! A session follows one ticket across turns:
//!
//! ```text
//! AwaitingFirstTurn → Processing
//! Processing        → AwaitingFeedback | Terminal
//! AwaitingFeedback  → Processing | Terminal
//! Terminal          → (none)
//! ```
//!
//! ANSWER parks the session in `AwaitingFeedback`; REFUSE and ESCALATE end it.
//! Satisfied feedback ends it; not-satisfied feedback bumps the follow-up
//! counter and re-enters `Processing` for a fresh turn. The session never
//! holds more than one turn awaiting feedback.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FailureKind, SessionError, Stage};
use crate::types::{
    AnalysisResult, Decision, EvaluationResult, Feedback, RetrievalResult, Ticket,
};

/// Opaque session identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    AwaitingFirstTurn,
    Processing,
    AwaitingFeedback,
    Terminal,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AwaitingFirstTurn => write!(f, "AWAITING_FIRST_TURN"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::AwaitingFeedback => write!(f, "AWAITING_FEEDBACK"),
            Self::Terminal => write!(f, "TERMINAL"),
        }
    }
}

fn is_legal_transition(from: SessionState, to: SessionState) -> bool {
    use SessionState::*;

    matches!(
        (from, to),
        (AwaitingFirstTurn, Processing)
            | (Processing, AwaitingFeedback)
            | (Processing, Terminal)
            | (AwaitingFeedback, Processing)
            | (AwaitingFeedback, Terminal)
    )
}

/// Why a turn escalated to a human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum EscalationCause {
    /// Confidence below the answer threshold.
    LowConfidence,
    /// A stage failed; the customer got the fallback message.
    InternalError { stage: Stage, kind: FailureKind },
    /// The follow-up budget ran out; the pipeline was not run.
    TurnLimit { follow_ups: u32 },
    /// PII was found and the PII policy is to escalate.
    PiiDetected,
}

impl fmt::Display for EscalationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::InternalError { stage, kind } => write!(f, "internal_error({stage}, {kind})"),
            Self::TurnLimit { follow_ups } => write!(f, "turn_limit({follow_ups})"),
            Self::PiiDetected => write!(f, "pii_detected"),
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Customer confirmed the answer solved the issue.
    Resolved,
    Refused,
    Escalated { cause: EscalationCause },
}

/// One pass through the pipeline and the customer's reaction to it.
///
/// Stage outputs are `None` when the stage never ran (skipped by the turn
/// limit or the PII policy, or an earlier stage failed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based.
    pub number: u32,
    /// The redacted ticket the stages saw.
    pub ticket: Ticket,
    pub analysis: Option<AnalysisResult>,
    pub retrieval: Option<RetrievalResult>,
    pub evaluation: Option<EvaluationResult>,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationCause>,
    /// The customer-facing text sent for this turn.
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Feedback>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: SessionState,
    pub to: SessionState,
    /// Number of turns recorded when the transition happened.
    pub turn: u32,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What the caller must do after feedback was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackAction {
    /// Session is terminal and resolved.
    Resolved,
    /// Session is back in `Processing`; run a turn on this follow-up text.
    FollowUp { message: String, follow_ups: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    ticket_id: String,
    state: SessionState,
    /// Not-satisfied rounds so far. Monotonic.
    follow_ups: u32,
    turns: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outcome: Option<SessionOutcome>,
    transitions: Vec<TransitionRecord>,
    created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(ticket_id: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            ticket_id: ticket_id.into(),
            state: SessionState::AwaitingFirstTurn,
            follow_ups: 0,
            turns: Vec::new(),
            outcome: None,
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn follow_ups(&self) -> u32 {
        self.follow_ups
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn latest_turn(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Number the next completed turn will carry.
    pub fn next_turn_number(&self) -> u32 {
        self.turns.len() as u32 + 1
    }

    pub fn outcome(&self) -> Option<&SessionOutcome> {
        self.outcome.as_ref()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn advance(&mut self, to: SessionState, reason: Option<&str>) -> Result<(), SessionError> {
        if !is_legal_transition(self.state, to) {
            return Err(SessionError::IllegalTransition {
                from: self.state,
                to,
            });
        }

        tracing::debug!(
            session_id = %self.id,
            from = %self.state,
            to = %to,
            turn = self.turns.len(),
            "Session transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            turn: self.turns.len() as u32,
            at: Utc::now(),
            reason: reason.map(String::from),
        });
        self.state = to;
        Ok(())
    }

    fn expect_state(&self, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidSessionState {
                id: self.id,
                state: self.state,
                expected,
            })
        }
    }

    /// Enter `Processing` for the initial submission.
    pub fn begin_first_turn(&mut self) -> Result<(), SessionError> {
        self.expect_state(SessionState::AwaitingFirstTurn)?;
        self.advance(SessionState::Processing, Some("ticket submitted"))
    }

    /// Record the finished turn and move to the state its decision implies.
    pub fn complete_turn(&mut self, turn: Turn) -> Result<SessionState, SessionError> {
        self.expect_state(SessionState::Processing)?;
        let decision = turn.decision;
        let cause = turn.escalation.clone();
        self.turns.push(turn);

        match decision {
            Decision::Answer => {
                self.advance(SessionState::AwaitingFeedback, Some("answered"))?;
            }
            Decision::Refuse => {
                self.advance(SessionState::Terminal, Some("refused"))?;
                self.outcome = Some(SessionOutcome::Refused);
            }
            Decision::Escalate => {
                let cause = cause.unwrap_or(EscalationCause::LowConfidence);
                let reason = format!("escalated: {cause}");
                self.advance(SessionState::Terminal, Some(&reason))?;
                self.outcome = Some(SessionOutcome::Escalated { cause });
            }
        }
        Ok(self.state)
    }

    /// Attach customer feedback to the turn awaiting it.
    ///
    /// Rejected with [`SessionError::InvalidSessionState`] unless the session
    /// is awaiting feedback, so feedback for terminal sessions never mutates
    /// anything.
    pub fn record_feedback(&mut self, feedback: Feedback) -> Result<FeedbackAction, SessionError> {
        self.expect_state(SessionState::AwaitingFeedback)?;

        let action = match &feedback {
            Feedback::Satisfied => {
                self.advance(SessionState::Terminal, Some("customer satisfied"))?;
                self.outcome = Some(SessionOutcome::Resolved);
                FeedbackAction::Resolved
            }
            Feedback::NotSatisfied { follow_up } => {
                self.advance(SessionState::Processing, Some("customer not satisfied"))?;
                self.follow_ups += 1;
                FeedbackAction::FollowUp {
                    message: follow_up.clone(),
                    follow_ups: self.follow_ups,
                }
            }
        };

        if let Some(turn) = self.turns.last_mut() {
            turn.feedback = Some(feedback);
        }
        Ok(action)
    }

    /// One-line history for logs.
    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut line = format!(
            "{} {} → {} ({} turns, {} follow-ups)",
            self.id,
            SessionState::AwaitingFirstTurn,
            self.state,
            self.turns.len(),
            self.follow_ups,
        );
        if !states.is_empty() {
            line.push_str(&format!(" [{}]", states.join(" → ")));
        }
        line
    }
}
