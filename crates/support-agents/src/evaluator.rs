//! Confidence evaluation: the topic gate, then solution-quality scoring.
//!
//! The gate runs first and never sees retrieved documents. An off-topic
//! verdict short-circuits with confidence 1.0; documents are ignored.
//! On-topic tickets are scored against the retrieved material. With nothing
//! retrieved there is nothing to ground an answer in, so the result is
//! no-match at 0.0 and the judge is not asked. The judge's label set for
//! that phase is perfect/partial/no-match only; any other label or an
//! inconsistent score fails closed as malformed output.

use std::sync::Arc;

use triage::{
    AnalysisResult, DecisionPolicy, EvaluationResult, Reasoning, RetrievalResult, Stage,
    StageError, Ticket,
};

use crate::agents::{Judgment, SolutionAssessment, TicketContext};
use crate::contracts::{self, JudgmentPayload, TopicVerdict};

pub struct Evaluator {
    judgment: Arc<dyn Judgment>,
    policy: DecisionPolicy,
}

impl Evaluator {
    pub fn new(judgment: Arc<dyn Judgment>, policy: DecisionPolicy) -> Self {
        Self { judgment, policy }
    }

    pub async fn evaluate(
        &self,
        ticket: &Ticket,
        analysis: &AnalysisResult,
        retrieval: &RetrievalResult,
    ) -> Result<EvaluationResult, StageError> {
        let context = TicketContext::new(ticket, analysis);

        let raw = self
            .judgment
            .assess_topic(&context)
            .await
            .map_err(|e| StageError::remote(Stage::Evaluation, format!("{e:#}")))?;
        let verdict: TopicVerdict = contracts::decode(&raw)
            .map_err(|e| StageError::malformed(Stage::Evaluation, format!("topic verdict: {e}")))?;

        if !verdict.on_topic {
            tracing::debug!(ticket_id = %ticket.id, "topic gate fired");
            return Ok(EvaluationResult::off_topic(verdict.explanation));
        }

        if retrieval.is_empty() {
            tracing::debug!(ticket_id = %ticket.id, "no documents retrieved");
            return Ok(EvaluationResult {
                confidence: 0.0,
                reasoning: Reasoning::NoMatch,
                explanation: "no knowledge base documents were retrieved".into(),
                aggregate_similarity: None,
            });
        }

        let aggregate_similarity = retrieval.aggregate_similarity();
        let assessment = SolutionAssessment {
            context,
            documents: retrieval.documents.clone(),
            aggregate_similarity,
        };
        let raw = self
            .judgment
            .assess_solution(&assessment)
            .await
            .map_err(|e| StageError::remote(Stage::Evaluation, format!("{e:#}")))?;
        let payload: JudgmentPayload = contracts::decode(&raw)
            .map_err(|e| StageError::malformed(Stage::Evaluation, format!("judgment: {e}")))?;

        let reasoning = match Reasoning::from_label(&payload.reasoning) {
            Some(Reasoning::OffTopic) => {
                return Err(StageError::malformed(
                    Stage::Evaluation,
                    "off-topic is not a solution-quality label",
                ))
            }
            Some(r) => r,
            None => {
                return Err(StageError::malformed(
                    Stage::Evaluation,
                    format!("unknown reasoning {:?}", payload.reasoning),
                ))
            }
        };

        let evaluation = EvaluationResult {
            confidence: payload.confidence_score,
            reasoning,
            explanation: payload.explanation,
            aggregate_similarity,
        };
        self.policy
            .check_consistency(&evaluation)
            .map_err(|detail| StageError::malformed(Stage::Evaluation, detail))?;

        Ok(evaluation)
    }
}
