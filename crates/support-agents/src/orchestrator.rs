//! Ticket resolution orchestrator.
//!
//! Per turn: redact → analyze → retrieve → evaluate → decide → compose.
//!
//! Stages run sequentially, each under its own timeout. Any stage failure
//! turns into an ESCALATE with an internal-error evaluation and the fallback
//! message, so the customer always receives one of the three decisions. The
//! session lock is held for the whole turn; independent sessions run
//! concurrently.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};
use triage::{
    AnalysisResult, Decision, DecisionPolicy, EscalationCause, EvaluationResult, Feedback,
    FeedbackAction, PiiPolicy, Reasoning, RedactedTicket, RedactionSummary, RetrievalResult, Session, SessionError,
    SessionId, SessionState, SessionStore, Stage, StageError, Ticket, Turn,
};

use crate::agents::Capabilities;
use crate::analyzer::Analyzer;
use crate::composer::Composer;
use crate::config::{StageTimeouts, SupportConfig};
use crate::evaluator::Evaluator;
use crate::retriever::Retriever;
use crate::telemetry::{StageTimings, TelemetrySink, TurnMetrics};

/// What the caller gets back after a turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub session_id: SessionId,
    pub turn: u32,
    pub decision: Decision,
    /// Customer-facing text.
    pub response: String,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationCause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    pub follow_ups: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum FeedbackOutcome {
    Resolved { session_id: SessionId },
    Turn(TurnOutcome),
}

/// Stage outputs gathered while a turn runs.
#[derive(Default)]
struct TurnWork {
    analysis: Option<AnalysisResult>,
    retrieval: Option<RetrievalResult>,
    evaluation: Option<EvaluationResult>,
    timings: StageTimings,
}

pub struct Orchestrator {
    analyzer: Analyzer,
    retriever: Retriever,
    evaluator: Evaluator,
    composer: Composer,
    policy: DecisionPolicy,
    timeouts: StageTimeouts,
    store: Arc<SessionStore>,
    telemetry: Option<TelemetrySink>,
}

impl Orchestrator {
    pub fn new(capabilities: Capabilities, config: &SupportConfig) -> Self {
        Self {
            analyzer: Analyzer::new(
                capabilities.understanding,
                config.analysis.summary_min_chars,
            ),
            retriever: Retriever::new(capabilities.search, config.knowledge.top_k),
            evaluator: Evaluator::new(capabilities.judgment, config.policy),
            composer: Composer::new(capabilities.generation, config.product.clone()),
            policy: config.policy,
            timeouts: config.timeouts,
            store: Arc::new(SessionStore::new()),
            telemetry: config.telemetry_path.clone().map(TelemetrySink::new),
        }
    }

    /// Share a session store with other orchestrators.
    pub fn with_store(mut self, store: Arc<SessionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub async fn session(&self, id: SessionId) -> Result<Session, SessionError> {
        self.store.snapshot(id).await
    }

    /// Forget sessions that reached a terminal state. Long-running callers
    /// invoke this periodically; evicted sessions reject feedback as unknown.
    pub async fn evict_terminal(&self) -> usize {
        let evicted = self.store.evict_terminal().await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted terminal sessions");
        }
        evicted.len()
    }

    /// Open a session for a new ticket and run its first turn.
    pub async fn submit(&self, ticket: Ticket) -> Result<TurnOutcome, SessionError> {
        let mut session = self.store.insert_locked(Session::new(&ticket.id)).await;
        info!(session_id = %session.id(), ticket_id = %ticket.id, "Ticket submitted");
        session.begin_first_turn()?;
        self.run_turn(&mut session, ticket).await
    }

    /// Record customer feedback on the turn awaiting it.
    ///
    /// Satisfied feedback closes the session. Not-satisfied feedback re-runs
    /// the whole pipeline on the follow-up text, unless the follow-up budget
    /// is used up, in which case the turn is escalated without running any
    /// stage. Feedback for a terminal or unknown session is rejected without
    /// touching it.
    pub async fn feedback(
        &self,
        id: SessionId,
        feedback: Feedback,
    ) -> Result<FeedbackOutcome, SessionError> {
        let mut session = self.store.lock(id).await?;
        let (previous, language) = match session.latest_turn() {
            Some(turn) => (
                turn.ticket.clone(),
                turn.analysis.as_ref().map(|a| a.language.clone()),
            ),
            None => {
                return Err(SessionError::InvalidSessionState {
                    id,
                    state: session.state(),
                    expected: SessionState::AwaitingFeedback,
                })
            }
        };

        match session.record_feedback(feedback)? {
            FeedbackAction::Resolved => {
                info!(session_id = %id, summary = %session.summary(), "Session resolved");
                Ok(FeedbackOutcome::Resolved { session_id: id })
            }
            FeedbackAction::FollowUp {
                message,
                follow_ups,
            } => {
                let ticket = previous.follow_up(message);
                let outcome = if self.policy.turn_limit_reached(follow_ups) {
                    let (redacted, redactions) = RedactedTicket::redact(ticket);
                    self.escalate_without_pipeline(
                        &mut session,
                        redacted,
                        &redactions,
                        EscalationCause::TurnLimit { follow_ups },
                        language.as_deref(),
                    )?
                } else {
                    self.run_turn(&mut session, ticket).await?
                };
                Ok(FeedbackOutcome::Turn(outcome))
            }
        }
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        ticket: Ticket,
    ) -> Result<TurnOutcome, SessionError> {
        let (redacted, redactions) = RedactedTicket::redact(ticket);

        if redactions.found_any() && self.policy.pii_policy == PiiPolicy::Escalate {
            return self.escalate_without_pipeline(
                session,
                redacted,
                &redactions,
                EscalationCause::PiiDetected,
                None,
            );
        }

        let started_at = Utc::now();
        let mut work = TurnWork::default();
        let (decision, response, escalation) = match self.pipeline(&redacted, &mut work).await {
            Ok((decision, response)) => {
                let escalation =
                    (decision == Decision::Escalate).then_some(EscalationCause::LowConfidence);
                (decision, response, escalation)
            }
            Err(e) => {
                warn!(
                    session_id = %session.id(),
                    stage = %e.stage(),
                    kind = %e.kind(),
                    error = %e,
                    "Stage failed, escalating"
                );
                work.evaluation = Some(EvaluationResult::internal_error(e.to_string()));
                let language = work.analysis.as_ref().map(|a| a.language.as_str());
                let response = self.composer.fallback(language);
                let cause = EscalationCause::InternalError {
                    stage: e.stage(),
                    kind: e.kind(),
                };
                (Decision::Escalate, response, Some(cause))
            }
        };

        let mut metrics = TurnMetrics::new(
            session.id(),
            session.ticket_id(),
            session.next_turn_number(),
            decision,
        )
        .with_description(&redacted.description);
        metrics.redactions = redactions.total();
        metrics.confidence = work.evaluation.as_ref().map(|e| e.confidence);
        metrics.reasoning = work.evaluation.as_ref().map(|e| e.reasoning);
        metrics.escalation = escalation.clone();
        metrics.stages = work.timings;

        let turn = Turn {
            number: session.next_turn_number(),
            ticket: redacted.into_inner(),
            analysis: work.analysis,
            retrieval: work.retrieval,
            evaluation: work.evaluation,
            decision,
            escalation,
            response,
            feedback: None,
            started_at,
            completed_at: Utc::now(),
        };
        self.finish_turn(session, turn, metrics)
    }

    /// Close the turn with ESCALATE and the fallback text. No stage runs.
    fn escalate_without_pipeline(
        &self,
        session: &mut Session,
        redacted: RedactedTicket,
        redactions: &RedactionSummary,
        cause: EscalationCause,
        language: Option<&str>,
    ) -> Result<TurnOutcome, SessionError> {
        let now = Utc::now();

        let mut metrics = TurnMetrics::new(
            session.id(),
            session.ticket_id(),
            session.next_turn_number(),
            Decision::Escalate,
        )
        .with_description(&redacted.description);
        metrics.redactions = redactions.total();
        metrics.escalation = Some(cause.clone());

        let turn = Turn {
            number: session.next_turn_number(),
            ticket: redacted.into_inner(),
            analysis: None,
            retrieval: None,
            evaluation: None,
            decision: Decision::Escalate,
            escalation: Some(cause),
            response: self.composer.fallback(language),
            feedback: None,
            started_at: now,
            completed_at: now,
        };
        self.finish_turn(session, turn, metrics)
    }

    fn finish_turn(
        &self,
        session: &mut Session,
        turn: Turn,
        metrics: TurnMetrics,
    ) -> Result<TurnOutcome, SessionError> {
        let mut outcome = TurnOutcome {
            session_id: session.id(),
            turn: turn.number,
            decision: turn.decision,
            response: turn.response.clone(),
            state: SessionState::Processing,
            escalation: turn.escalation.clone(),
            confidence: turn.evaluation.as_ref().map(|e| e.confidence),
            reasoning: turn.evaluation.as_ref().map(|e| e.reasoning),
            follow_ups: session.follow_ups(),
        };
        outcome.state = session.complete_turn(turn)?;

        info!(
            session_id = %outcome.session_id,
            turn = outcome.turn,
            decision = %outcome.decision,
            confidence = ?outcome.confidence,
            reasoning = ?outcome.reasoning,
            state = %outcome.state,
            digest = %metrics.description_digest,
            "Turn complete"
        );
        if let Some(sink) = &self.telemetry {
            sink.append(&metrics);
        }
        Ok(outcome)
    }

    async fn pipeline(
        &self,
        ticket: &RedactedTicket,
        work: &mut TurnWork,
    ) -> Result<(Decision, String), StageError> {
        let analysis = self
            .run_stage(Stage::Analysis, &mut work.timings, self.analyzer.analyze(ticket))
            .await?;
        let analysis = work.analysis.insert(analysis);

        let retrieval = self
            .run_stage(Stage::Retrieval, &mut work.timings, self.retriever.retrieve(analysis))
            .await?;
        let retrieval = work.retrieval.insert(retrieval);

        let evaluation = self
            .run_stage(
                Stage::Evaluation,
                &mut work.timings,
                self.evaluator.evaluate(ticket, analysis, retrieval),
            )
            .await?;
        let evaluation = work.evaluation.insert(evaluation);

        let decision = self.policy.decide(evaluation);
        let response = self
            .run_stage(
                Stage::Composition,
                &mut work.timings,
                self.composer
                    .compose(decision, ticket, analysis, retrieval, evaluation),
            )
            .await?;
        Ok((decision, response))
    }

    /// Run one stage under its timeout. A timeout is a stage failure.
    async fn run_stage<T, F>(
        &self,
        stage: Stage,
        timings: &mut StageTimings,
        fut: F,
    ) -> Result<T, StageError>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        let budget = self.timeouts.for_stage(stage);
        let started = Instant::now();
        let result = match tokio::time::timeout(budget, fut).await {
            Ok(result) => result,
            Err(_) => Err(StageError::RemoteTimeout {
                stage,
                after: budget,
            }),
        };
        timings.record(stage, started.elapsed());
        result
    }
}
