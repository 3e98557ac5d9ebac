//! Analysis stage: redacted ticket → validated `AnalysisResult`.

use std::collections::HashSet;
use std::sync::Arc;

use triage::{AnalysisResult, RedactedTicket, Sentiment, Stage, StageError};

use crate::agents::{AnalysisRequest, LanguageUnderstanding};
use crate::contracts::{self, AnalysisPayload};

/// Strings models emit in place of a missing summary.
const SUMMARY_PLACEHOLDERS: &[&str] = &["", "null", "none", "n/a", "na", "-"];

pub struct Analyzer {
    understanding: Arc<dyn LanguageUnderstanding>,
    summary_min_chars: usize,
}

impl Analyzer {
    pub fn new(understanding: Arc<dyn LanguageUnderstanding>, summary_min_chars: usize) -> Self {
        Self {
            understanding,
            summary_min_chars,
        }
    }

    pub async fn analyze(&self, ticket: &RedactedTicket) -> Result<AnalysisResult, StageError> {
        let request = AnalysisRequest::from_ticket(ticket);
        let raw = self
            .understanding
            .understand(&request)
            .await
            .map_err(|e| StageError::remote(Stage::Analysis, format!("{e:#}")))?;

        let payload: AnalysisPayload = contracts::decode(&raw)
            .map_err(|e| StageError::malformed(Stage::Analysis, e.to_string()))?;

        self.validate(ticket, payload)
    }

    fn validate(
        &self,
        ticket: &RedactedTicket,
        payload: AnalysisPayload,
    ) -> Result<AnalysisResult, StageError> {
        let sentiment = Sentiment::from_label(&payload.sentiment).ok_or_else(|| {
            StageError::malformed(
                Stage::Analysis,
                format!("unknown sentiment {:?}", payload.sentiment),
            )
        })?;

        let keywords = dedupe_keywords(payload.keywords);
        if keywords.is_empty() {
            return Err(StageError::malformed(Stage::Analysis, "no keywords"));
        }

        let language = payload.language.trim().to_string();
        if language.is_empty() {
            return Err(StageError::malformed(Stage::Analysis, "empty language"));
        }

        let long_enough = ticket.description.chars().count() >= self.summary_min_chars;
        let summary = payload
            .summary
            .map(|s| s.trim().to_string())
            .filter(|s| !is_placeholder(s))
            .filter(|_| long_enough);

        Ok(AnalysisResult {
            ticket_id: ticket.id.clone(),
            sentiment,
            keywords,
            language,
            summary,
        })
    }
}

fn is_placeholder(summary: &str) -> bool {
    let lower = summary.to_ascii_lowercase();
    SUMMARY_PLACEHOLDERS.contains(&lower.as_str())
}

/// Trim, drop empties, and remove case-insensitive duplicates keeping first order.
fn dedupe_keywords(keywords: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use triage::{FailureKind, Ticket};

    struct Scripted {
        reply: Result<String, String>,
        captured: Mutex<Vec<AnalysisRequest>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.into()),
                captured: Mutex::new(Vec::new()),
            })
        }

        fn err(message: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message.into()),
                captured: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageUnderstanding for Scripted {
        async fn understand(&self, request: &AnalysisRequest) -> Result<String> {
            self.captured.lock().unwrap().push(request.clone());
            self.reply.clone().map_err(|e| anyhow::anyhow!(e))
        }
    }

    fn ticket(description: &str) -> RedactedTicket {
        RedactedTicket::redact(Ticket {
            id: "T-1".into(),
            subject: "Login".into(),
            category: "Account".into(),
            description: description.into(),
            client_id: "C-1".into(),
            timestamp: Utc::now(),
        })
        .0
    }

    #[tokio::test]
    async fn short_ticket_never_has_summary() {
        let scripted = Scripted::ok(
            r#"{"sentiment":"Neutral","keywords":["password","reset","Password"],"language":"English","summary":"User wants a reset"}"#,
        );
        let analyzer = Analyzer::new(scripted.clone(), 280);
        let result = analyzer.analyze(&ticket("How do I reset my password?")).await.unwrap();

        assert_eq!(result.sentiment, Sentiment::Neutral);
        assert_eq!(result.keywords, vec!["password", "reset"]);
        assert_eq!(result.summary, None);
        assert_eq!(result.ticket_id, "T-1");
    }

    #[tokio::test]
    async fn long_ticket_keeps_summary_but_not_placeholders() {
        let long = "word ".repeat(80);
        let scripted = Scripted::ok(
            r#"{"sentiment":"negative","keywords":["sync"],"language":"French","summary":"Sync fails nightly"}"#,
        );
        let analyzer = Analyzer::new(scripted, 280);
        let result = analyzer.analyze(&ticket(&long)).await.unwrap();
        assert_eq!(result.summary.as_deref(), Some("Sync fails nightly"));

        let scripted = Scripted::ok(
            r#"{"sentiment":"negative","keywords":["sync"],"language":"French","summary":"N/A"}"#,
        );
        let analyzer = Analyzer::new(scripted, 280);
        let result = analyzer.analyze(&ticket(&long)).await.unwrap();
        assert_eq!(result.summary, None);
    }

    #[tokio::test]
    async fn fenced_output_is_recovered() {
        let scripted = Scripted::ok(
            "```json\n{\"sentiment\":\"positive\",\"keywords\":[\"export\"],\"language\":\"Spanish\",\"summary\":null}\n```",
        );
        let analyzer = Analyzer::new(scripted, 280);
        let result = analyzer.analyze(&ticket("¿Cómo exporto mis datos?")).await.unwrap();
        assert_eq!(result.language, "Spanish");
    }

    #[tokio::test]
    async fn capability_sees_redacted_text_only() {
        let scripted = Scripted::ok(
            r#"{"sentiment":"neutral","keywords":["login"],"language":"English","summary":null}"#,
        );
        let analyzer = Analyzer::new(scripted.clone(), 280);
        analyzer
            .analyze(&ticket("I am jane@example.com and cannot log in"))
            .await
            .unwrap();
        let captured = scripted.captured.lock().unwrap();
        assert_eq!(captured[0].description, "I am [EMAIL_REDACTED] and cannot log in");
    }

    #[tokio::test]
    async fn empty_keywords_are_malformed() {
        let scripted =
            Scripted::ok(r#"{"sentiment":"neutral","keywords":[" "],"language":"English"}"#);
        let err = Analyzer::new(scripted, 280)
            .analyze(&ticket("help"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Malformed);
        assert_eq!(err.stage(), Stage::Analysis);
    }

    #[tokio::test]
    async fn unknown_sentiment_is_malformed() {
        let scripted =
            Scripted::ok(r#"{"sentiment":"furious","keywords":["x"],"language":"English"}"#);
        let err = Analyzer::new(scripted, 280)
            .analyze(&ticket("help"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Malformed);
    }

    #[tokio::test]
    async fn prose_is_malformed() {
        let scripted = Scripted::ok("The customer seems upset about passwords.");
        let err = Analyzer::new(scripted, 280)
            .analyze(&ticket("help"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Malformed);
    }

    #[tokio::test]
    async fn transport_failure_is_remote() {
        let err = Analyzer::new(Scripted::err("connection reset"), 280)
            .analyze(&ticket("help"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Remote);
        assert!(err.to_string().contains("connection reset"));
    }
}
