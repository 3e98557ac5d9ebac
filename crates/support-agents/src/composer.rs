//! Composition stage: decision + pipeline outputs → customer-facing text.
//!
//! Generated text is checked before it leaves the stage. A reply that
//! discloses machine generation, quotes the judge's explanation or leaks an
//! internal category label is a policy violation and never reaches the
//! customer; the orchestrator sends the fallback template instead.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use triage::{
    AnalysisResult, Decision, EvaluationResult, RetrievalResult, Sentiment, Stage, StageError,
    Ticket,
};

use crate::agents::{Generation, GenerationRequest};
use crate::config::ProductConfig;

/// Characters of each document passed to generation.
pub const DOCUMENT_EXCERPT_CHARS: usize = 500;

pub const NO_KNOWLEDGE: &str = "No specific knowledge found.";

const DEFAULT_TONE: &str = "Professional and helpful.";
const NEGATIVE_TONE: &str = "Empathetic, apologetic, and reassuring. Prioritize de-escalation.";

/// Minimum explanation length checked for verbatim leaks.
const MIN_LEAK_CHARS: usize = 20;

static AI_DISCLOSURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:as an ai|an ai assistant|language model|i am an ai|i'm an ai|automated system|chatbot)\b",
    )
    .expect("AI_DISCLOSURE regex should compile")
});

static INTERNAL_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:perfect[_-]match|partial[_-]match|no[_-]match|internal[_-]error|off_topic|confidence_score)\b",
    )
    .expect("INTERNAL_LABEL regex should compile")
});

/// Numbered document excerpts for the generation prompt.
pub fn knowledge_context(retrieval: &RetrievalResult) -> String {
    if retrieval.is_empty() {
        return NO_KNOWLEDGE.to_string();
    }
    retrieval
        .documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let excerpt: String = doc.content.chars().take(DOCUMENT_EXCERPT_CHARS).collect();
            format!("[{}] {}", i + 1, excerpt.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn tone_directive(sentiment: Sentiment) -> &'static str {
    match sentiment {
        Sentiment::Negative => NEGATIVE_TONE,
        Sentiment::Positive | Sentiment::Neutral => DEFAULT_TONE,
    }
}

/// Remove a code fence wrapping the whole reply.
fn strip_wrappers(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Drop an info string such as ```text
        let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
        return body.trim_end().trim_end_matches("```").trim();
    }
    trimmed
}

fn check_policy(text: &str, evaluation: &EvaluationResult) -> Result<(), String> {
    if let Some(m) = AI_DISCLOSURE.find(text) {
        return Err(format!("reply discloses machine generation ({:?})", m.as_str()));
    }
    if let Some(m) = INTERNAL_LABEL.find(text) {
        return Err(format!("reply leaks internal label {:?}", m.as_str()));
    }
    let explanation = evaluation.explanation.trim();
    if explanation.chars().count() >= MIN_LEAK_CHARS
        && text.to_lowercase().contains(&explanation.to_lowercase())
    {
        return Err("reply quotes the internal explanation".to_string());
    }
    Ok(())
}

/// Language family used by the fallback templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TemplateLanguage {
    English,
    French,
    Spanish,
}

impl TemplateLanguage {
    fn sources_label(self) -> &'static str {
        match self {
            Self::English => "Sources:",
            Self::French => "Sources :",
            Self::Spanish => "Fuentes:",
        }
    }

    fn detect(language: Option<&str>) -> Self {
        let lower = language.map(|l| l.trim().to_lowercase()).unwrap_or_default();
        if lower.starts_with("fr") {
            Self::French
        } else if lower.starts_with("es") || lower.starts_with("spa") || lower.starts_with("espa") {
            Self::Spanish
        } else {
            Self::English
        }
    }
}

pub struct Composer {
    generation: Arc<dyn Generation>,
    product: ProductConfig,
}

impl Composer {
    pub fn new(generation: Arc<dyn Generation>, product: ProductConfig) -> Self {
        Self { generation, product }
    }

    pub async fn compose(
        &self,
        decision: Decision,
        ticket: &Ticket,
        analysis: &AnalysisResult,
        retrieval: &RetrievalResult,
        evaluation: &EvaluationResult,
    ) -> Result<String, StageError> {
        let request = GenerationRequest {
            decision,
            issue_summary: analysis
                .summary
                .clone()
                .unwrap_or_else(|| ticket.description.clone()),
            sentiment: analysis.sentiment,
            knowledge_context: knowledge_context(retrieval),
            sources: retrieval.sources.clone(),
            confidence: evaluation.confidence,
            reasoning: evaluation.reasoning,
            language: analysis.language.clone(),
            tone: tone_directive(analysis.sentiment).to_string(),
        };

        let raw = self
            .generation
            .generate(&request)
            .await
            .map_err(|e| StageError::remote(Stage::Composition, format!("{e:#}")))?;

        let text = strip_wrappers(&raw);
        if text.is_empty() {
            return Err(StageError::malformed(Stage::Composition, "empty reply"));
        }
        check_policy(text, evaluation).map_err(|d| StageError::policy(Stage::Composition, d))?;

        let mut reply = text.to_string();
        if decision == Decision::Answer
            && !retrieval.sources.is_empty()
            && !retrieval.sources.iter().any(|s| reply.contains(s.as_str()))
        {
            let label = TemplateLanguage::detect(Some(&analysis.language)).sources_label();
            reply.push_str(&format!("\n\n{label} {}", retrieval.sources.join(", ")));
        }
        Ok(reply)
    }

    /// Deterministic escalation text sent when a stage fails or the pipeline
    /// was skipped. Every failure escalates, so there is no refusal variant.
    pub fn fallback(&self, language: Option<&str>) -> String {
        let name = &self.product.name;
        match TemplateLanguage::detect(language) {
            TemplateLanguage::English => format!(
                "Hello,\n\nThank you for contacting us. We have received your request and a \
                 specialist from our team will review it and get back to you shortly.\n\n\
                 Kind regards,\nThe {name} Support Team"
            ),
            TemplateLanguage::French => format!(
                "Bonjour,\n\nMerci de nous avoir contactés. Nous avons bien reçu votre demande \
                 et un spécialiste de notre équipe va l'examiner et reviendra vers vous très \
                 prochainement.\n\nCordialement,\nL'équipe d'assistance {name}"
            ),
            TemplateLanguage::Spanish => format!(
                "Hola,\n\nGracias por contactarnos. Hemos recibido su solicitud y un \
                 especialista de nuestro equipo la revisará y se pondrá en contacto con usted \
                 en breve.\n\nSaludos cordiales,\nEl equipo de soporte de {name}"
            ),
        }
    }
}
