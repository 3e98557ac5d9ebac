//! Confidence threshold policy.
//!
//! Maps the single authoritative [`EvaluationResult`] of a turn to a
//! [`Decision`]. Nothing here recomputes confidence; the policy only reads it.

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::{Decision, EvaluationResult, Reasoning};

pub const DEFAULT_ANSWER_THRESHOLD: f64 = 0.6;
pub const DEFAULT_REFUSE_THRESHOLD: f64 = 0.9;
pub const DEFAULT_MAX_TURNS: u32 = 3;

/// What to do when the redactor found PII in a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiPolicy {
    /// Continue the pipeline on the redacted text.
    #[default]
    RedactAndContinue,
    /// Skip analysis and hand the ticket to a human.
    Escalate,
}

impl std::str::FromStr for PiiPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "redact_and_continue" | "redact" => Ok(Self::RedactAndContinue),
            "escalate" => Ok(Self::Escalate),
            other => Err(format!("unknown pii policy '{other}'")),
        }
    }
}

/// Thresholds and limits that turn evaluations into decisions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    /// Inclusive lower bound for ANSWER.
    pub answer_threshold: f64,
    /// Confidence at or above which only off-topic or perfect-match is consistent.
    pub refuse_threshold: f64,
    /// Not-satisfied follow-ups allowed before ESCALATE is forced.
    pub max_turns: u32,
    pub pii_policy: PiiPolicy,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            answer_threshold: DEFAULT_ANSWER_THRESHOLD,
            refuse_threshold: DEFAULT_REFUSE_THRESHOLD,
            max_turns: DEFAULT_MAX_TURNS,
            pii_policy: PiiPolicy::default(),
        }
    }
}

impl DecisionPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !(self.answer_threshold > 0.0 && self.answer_threshold <= 1.0) {
            return Err(PolicyError::AnswerThreshold(self.answer_threshold));
        }
        if !(self.refuse_threshold >= self.answer_threshold && self.refuse_threshold <= 1.0) {
            return Err(PolicyError::RefuseThreshold {
                answer: self.answer_threshold,
                refuse: self.refuse_threshold,
            });
        }
        if self.max_turns == 0 {
            return Err(PolicyError::ZeroTurns);
        }
        Ok(())
    }

    /// Map an evaluation to a decision.
    ///
    /// Off-topic refuses regardless of confidence. A stage failure always
    /// escalates. Otherwise confidence at or above the answer threshold answers.
    pub fn decide(&self, evaluation: &EvaluationResult) -> Decision {
        match evaluation.reasoning {
            Reasoning::OffTopic => Decision::Refuse,
            Reasoning::InternalError => Decision::Escalate,
            _ if evaluation.confidence >= self.answer_threshold => Decision::Answer,
            _ => Decision::Escalate,
        }
    }

    /// Whether the follow-up counter has used up the turn budget.
    pub fn turn_limit_reached(&self, follow_ups: u32) -> bool {
        follow_ups >= self.max_turns
    }

    /// Required consistency check on a judgment before it is accepted.
    ///
    /// Confidence must be finite and inside `[0, 1]`, and a confidence at or
    /// above the refuse threshold is only consistent with off-topic or
    /// perfect-match. Returns a description of the violation.
    pub fn check_consistency(&self, evaluation: &EvaluationResult) -> Result<(), String> {
        let c = evaluation.confidence;
        if !c.is_finite() || !(0.0..=1.0).contains(&c) {
            return Err(format!("confidence {c} outside [0, 1]"));
        }
        if c >= self.refuse_threshold
            && !matches!(
                evaluation.reasoning,
                Reasoning::OffTopic | Reasoning::PerfectMatch
            )
        {
            return Err(format!(
                "confidence {c:.2} is inconsistent with reasoning {}",
                evaluation.reasoning
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(confidence: f64, reasoning: Reasoning) -> EvaluationResult {
        EvaluationResult {
            confidence,
            reasoning,
            explanation: String::new(),
            aggregate_similarity: None,
        }
    }

    #[test]
    fn off_topic_refuses_regardless_of_confidence() {
        let policy = DecisionPolicy::default();
        for c in [0.0, 0.3, 0.6, 1.0] {
            assert_eq!(policy.decide(&eval(c, Reasoning::OffTopic)), Decision::Refuse);
        }
    }

    #[test]
    fn answer_threshold_is_inclusive() {
        let policy = DecisionPolicy::default();
        assert_eq!(policy.decide(&eval(0.6, Reasoning::PartialMatch)), Decision::Answer);
        assert_eq!(policy.decide(&eval(1.0, Reasoning::PerfectMatch)), Decision::Answer);
    }

    #[test]
    fn below_threshold_escalates() {
        let policy = DecisionPolicy::default();
        assert_eq!(policy.decide(&eval(0.59, Reasoning::PartialMatch)), Decision::Escalate);
        assert_eq!(policy.decide(&eval(0.0, Reasoning::NoMatch)), Decision::Escalate);
    }

    #[test]
    fn internal_error_always_escalates() {
        let policy = DecisionPolicy::default();
        assert_eq!(
            policy.decide(&EvaluationResult::internal_error("timeout")),
            Decision::Escalate
        );
    }

    #[test]
    fn custom_threshold_is_honoured() {
        let policy = DecisionPolicy {
            answer_threshold: 0.8,
            ..Default::default()
        };
        assert_eq!(policy.decide(&eval(0.7, Reasoning::PartialMatch)), Decision::Escalate);
    }

    #[test]
    fn turn_limit() {
        let policy = DecisionPolicy::default();
        assert!(!policy.turn_limit_reached(0));
        assert!(!policy.turn_limit_reached(2));
        assert!(policy.turn_limit_reached(3));
    }

    #[test]
    fn consistency_rejects_high_confidence_partial_match() {
        let policy = DecisionPolicy::default();
        assert!(policy.check_consistency(&eval(0.95, Reasoning::PartialMatch)).is_err());
        assert!(policy.check_consistency(&eval(0.9, Reasoning::NoMatch)).is_err());
        assert!(policy.check_consistency(&eval(0.95, Reasoning::PerfectMatch)).is_ok());
        assert!(policy.check_consistency(&eval(1.0, Reasoning::OffTopic)).is_ok());
        assert!(policy.check_consistency(&eval(0.5, Reasoning::PartialMatch)).is_ok());
    }

    #[test]
    fn consistency_rejects_out_of_range() {
        let policy = DecisionPolicy::default();
        assert!(policy.check_consistency(&eval(1.2, Reasoning::PerfectMatch)).is_err());
        assert!(policy.check_consistency(&eval(-0.1, Reasoning::NoMatch)).is_err());
        assert!(policy.check_consistency(&eval(f64::NAN, Reasoning::NoMatch)).is_err());
    }

    #[test]
    fn validate_ranges() {
        assert!(DecisionPolicy::default().validate().is_ok());
        let bad = DecisionPolicy {
            answer_threshold: 0.0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(PolicyError::AnswerThreshold(0.0)));
        let bad = DecisionPolicy {
            refuse_threshold: 0.5,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(PolicyError::RefuseThreshold { .. })));
        let bad = DecisionPolicy {
            max_turns: 0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(PolicyError::ZeroTurns));
    }

    #[test]
    fn pii_policy_parses() {
        assert_eq!("escalate".parse::<PiiPolicy>(), Ok(PiiPolicy::Escalate));
        assert_eq!(
            "Redact-And-Continue".parse::<PiiPolicy>(),
            Ok(PiiPolicy::RedactAndContinue)
        );
        assert!("drop".parse::<PiiPolicy>().is_err());
    }
}
