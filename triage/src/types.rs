//! Domain records that flow through a single resolution turn.
//!
//! ```text
//! Ticket ──redact──▶ RedactedTicket ──▶ AnalysisResult ──▶ RetrievalResult
//!                                                   └──────────┴──▶ EvaluationResult ──▶ Decision
//! ```
//!
//! Every record here is produced once per turn and is immutable afterwards.

use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::redact::{self, RedactionSummary};

/// A customer-submitted support request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    pub category: String,
    pub description: String,
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
}

impl Ticket {
    /// Build the ticket for a follow-up turn: same identity and metadata,
    /// the customer's follow-up message as the new description.
    pub fn follow_up(&self, message: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            subject: self.subject.clone(),
            category: self.category.clone(),
            description: message.into(),
            client_id: self.client_id.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// A ticket whose description has been through the PII redactor.
///
/// The only constructor runs the redactor, so every stage that takes a
/// `RedactedTicket` is guaranteed to never see raw PII.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedactedTicket(Ticket);

impl RedactedTicket {
    /// Replace the description with its redacted form and report what was found.
    pub fn redact(mut ticket: Ticket) -> (Self, RedactionSummary) {
        let summary = redact::scan(&ticket.description);
        if summary.found_any() {
            ticket.description = redact::redact(&ticket.description).into_owned();
        }
        (Self(ticket), summary)
    }

    pub fn into_inner(self) -> Ticket {
        self.0
    }
}

impl Deref for RedactedTicket {
    type Target = Ticket;

    fn deref(&self) -> &Ticket {
        &self.0
    }
}

/// Customer sentiment as detected by language understanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    /// Parse a sentiment label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            _ => None,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Neutral => write!(f, "neutral"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

/// Validated output of the analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub ticket_id: String,
    pub sentiment: Sentiment,
    /// Ordered, de-duplicated, never empty.
    pub keywords: Vec<String>,
    pub language: String,
    /// Only present for long descriptions. Never a placeholder string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// One knowledge-base passage returned by search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateDocument {
    pub content: String,
    pub source: String,
    /// Similarity in `[0, 1]` when the search backend supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Output of the retrieval stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The query string actually issued.
    pub query: String,
    pub documents: Vec<CandidateDocument>,
    /// Distinct source identifiers in first-seen order.
    pub sources: Vec<String>,
}

impl RetrievalResult {
    pub fn new(query: impl Into<String>, documents: Vec<CandidateDocument>) -> Self {
        let mut sources: Vec<String> = Vec::new();
        for doc in &documents {
            if !sources.iter().any(|s| s == &doc.source) {
                sources.push(doc.source.clone());
            }
        }
        Self {
            query: query.into(),
            documents,
            sources,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Mean of the strictly positive similarity scores.
    ///
    /// `None` when no document carries a usable score. This is a secondary
    /// signal for the judgment stage only; it is never a confidence.
    pub fn aggregate_similarity(&self) -> Option<f64> {
        let scores: Vec<f64> = self
            .documents
            .iter()
            .filter_map(|d| d.similarity)
            .filter(|s| *s > 0.0)
            .collect();
        if scores.is_empty() {
            None
        } else {
            Some(scores.iter().sum::<f64>() / scores.len() as f64)
        }
    }
}

/// Closed set of reasoning categories attached to an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Reasoning {
    /// Retrieved material contains a complete solution.
    PerfectMatch,
    /// Retrieved material only partially covers the issue.
    PartialMatch,
    /// Candidates exist but are irrelevant to a valid query.
    NoMatch,
    /// The ticket is outside the supported product domain.
    OffTopic,
    /// Recorded by the orchestrator when a stage failed.
    InternalError,
}

impl Reasoning {
    /// Parse a category label as emitted by the judgment capability.
    ///
    /// Accepts `perfect_match`, `perfect-match` and `Perfect match` alike.
    /// `internal-error` is never accepted from outside.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .chars()
            .map(|c| match c {
                '-' | ' ' => '_',
                other => other.to_ascii_lowercase(),
            })
            .collect();
        match normalized.as_str() {
            "perfect_match" => Some(Self::PerfectMatch),
            "partial_match" => Some(Self::PartialMatch),
            "no_match" => Some(Self::NoMatch),
            "off_topic" => Some(Self::OffTopic),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PerfectMatch => "perfect-match",
            Self::PartialMatch => "partial-match",
            Self::NoMatch => "no-match",
            Self::OffTopic => "off-topic",
            Self::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for Reasoning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single authoritative confidence judgment for a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    pub reasoning: Reasoning,
    /// Short internal explanation from the judge. Never shown to customers.
    #[serde(default)]
    pub explanation: String,
    /// Secondary signal that was supplied to the judge, kept for audit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_similarity: Option<f64>,
}

impl EvaluationResult {
    /// Result of the topic gate firing.
    pub fn off_topic(explanation: impl Into<String>) -> Self {
        Self {
            confidence: 1.0,
            reasoning: Reasoning::OffTopic,
            explanation: explanation.into(),
            aggregate_similarity: None,
        }
    }

    /// Lowest-confidence result recorded when a stage failed.
    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self {
            confidence: 0.0,
            reasoning: Reasoning::InternalError,
            explanation: detail.into(),
            aggregate_similarity: None,
        }
    }
}

/// What the orchestrator does with a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Send the composed solution and wait for feedback.
    Answer,
    /// Politely refuse an out-of-scope query.
    Refuse,
    /// Hand the ticket to a human agent.
    Escalate,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answer => write!(f, "ANSWER"),
            Self::Refuse => write!(f, "REFUSE"),
            Self::Escalate => write!(f, "ESCALATE"),
        }
    }
}

/// Customer reaction to an answered turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Feedback {
    Satisfied,
    NotSatisfied { follow_up: String },
}
