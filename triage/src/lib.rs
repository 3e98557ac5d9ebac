//! Deterministic core of the support resolution pipeline.
//!
//! Everything in this crate is free of remote calls: domain records, the PII
//! redactor, the confidence decision policy, the per-ticket session state
//! machine and the session store. The `support-agents` crate wires these to
//! language services.

pub mod error;
pub mod policy;
pub mod redact;
pub mod session;
pub mod store;
pub mod types;

pub use error::{FailureKind, PolicyError, SessionError, Stage, StageError};
pub use policy::{DecisionPolicy, PiiPolicy};
pub use redact::{redact, PiiCategory, RedactionSummary};
pub use session::{
    EscalationCause, FeedbackAction, Session, SessionId, SessionOutcome, SessionState, Turn,
};
pub use store::{SessionHandle, SessionStore};
pub use types::{
    AnalysisResult, CandidateDocument, Decision, EvaluationResult, Feedback, Reasoning,
    RedactedTicket, RetrievalResult, Sentiment, Ticket,
};
