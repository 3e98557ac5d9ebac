//! Preambles and prompt templates for each agent role.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever preamble or template
//! content changes. The version is recorded with every turn in telemetry so
//! a decision can be traced back to the prompts that produced it.

use triage::{Decision, Reasoning, Sentiment};

use crate::agents::{AnalysisRequest, GenerationRequest, SolutionAssessment, TicketContext};
use crate::config::ProductConfig;
use crate::contracts::{schema_hint, AnalysisPayload, JudgmentPayload, TopicVerdict};

/// Prompt version. Bump on any preamble content change.
pub const PROMPT_VERSION: &str = "1.3.0";

pub const ANALYST_PREAMBLE: &str = "\
You analyze customer support tickets. For every ticket you report the customer's \
sentiment, the keywords that best describe the problem, and the language the \
customer wrote in.

Rules:
- Always return sentiment and at least one keyword.
- Sentiment is exactly one of: positive, neutral, negative.
- Keywords are short search terms taken from the ticket, most important first.
- Language is the English name of the customer's language (English, French, Spanish, ...).
- Only write a summary when the description is long. For short descriptions return \"summary\": null.
- Placeholders such as [EMAIL_REDACTED] are removed personal data. Never try to guess them.

Return ONLY a JSON object. No commentary, no code fences.";

/// Judge preamble scoped to the supported product.
pub fn judge_preamble(product: &ProductConfig) -> String {
    format!(
        "You are the quality judge for the customer support desk of \"{name}\" ({description}).\n\
         Valid topics: {topics}.\n\
         Anything unrelated to {name} or its software support (cooking, sports, weather, \
         general knowledge, competitors) is off-topic.\n\n\
         You only ever return a single JSON object. No commentary, no code fences.",
        name = product.name,
        description = product.description,
        topics = product.topics.join(", "),
    )
}

/// Writer preamble scoped to the supported product.
pub fn writer_preamble(product: &ProductConfig) -> String {
    format!(
        "You are a senior customer support specialist for \"{name}\" writing an email reply \
         to a customer.\n\n\
         Rules:\n\
         - NEVER mention that you are an AI, a language model, a bot or an automated system.\n\
         - Write as a person would: natural, warm and direct.\n\
         - Reply in the customer's language.\n\
         - Never quote internal notes, scores or category labels.\n\
         - Never invent steps that are not in the provided knowledge.\n\
         - Return plain text ready to send. No JSON, no code fences.",
        name = product.name,
    )
}

pub fn analysis_prompt(request: &AnalysisRequest) -> String {
    format!(
        "Ticket subject:\n{subject}\n\n\
         Ticket category:\n{category}\n\n\
         Ticket description:\n{description}\n\n\
         Return JSON matching this schema:\n{schema}",
        subject = request.subject,
        category = request.category,
        description = request.description,
        schema = schema_hint::<AnalysisPayload>(),
    )
}

fn render_context(context: &TicketContext) -> String {
    format!(
        "Subject: {}\nCategory: {}\nKeywords: {}\nSummary: {}\nDescription:\n{}",
        context.subject,
        context.category,
        context.keywords.join(", "),
        context.summary.as_deref().unwrap_or("(none)"),
        context.description,
    )
}

/// Topic gate prompt. Carries no documents so retrieval can never sway it.
pub fn topic_prompt(context: &TicketContext) -> String {
    format!(
        "Decide whether this ticket is within the scope of the support desk.\n\n\
         {ticket}\n\n\
         Set \"on_topic\" to false only when the request has nothing to do with the product \
         or its support. Vague or incomplete product questions are still on-topic.\n\n\
         Return JSON matching this schema:\n{schema}",
        ticket = render_context(context),
        schema = schema_hint::<TopicVerdict>(),
    )
}

pub fn solution_prompt(assessment: &SolutionAssessment) -> String {
    let documents = if assessment.documents.is_empty() {
        "(no documents were retrieved)".to_string()
    } else {
        assessment
            .documents
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                let similarity = doc
                    .similarity
                    .map(|s| format!("{s:.4}"))
                    .unwrap_or_else(|| "n/a".into());
                format!(
                    "[Doc {}] (Source: {}, Similarity: {})\n{}",
                    i + 1,
                    doc.source,
                    similarity,
                    doc.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n---\n")
    };
    let average = assessment
        .aggregate_similarity
        .map(|s| format!("{s:.4}"))
        .unwrap_or_else(|| "n/a".into());

    format!(
        "The ticket below is on-topic. Judge whether the retrieved documents solve it.\n\n\
         {ticket}\n\n\
         Retrieved documents:\n{documents}\n\n\
         Average similarity (secondary signal only): {average}\n\n\
         Read the documents and score them:\n\
         - 1.00 with reasoning \"perfect_match\" when they contain the full solution.\n\
         - 0.50 with reasoning \"partial_match\" when they contain partial information.\n\
         - 0.00 with reasoning \"no_match\" when they are irrelevant or missing.\n\
         Put a one-sentence justification in \"explanation\".\n\n\
         Return JSON matching this schema:\n{schema}",
        ticket = render_context(&assessment.context),
        schema = schema_hint::<JudgmentPayload>(),
    )
}

fn decision_instructions(request: &GenerationRequest) -> String {
    match request.decision {
        Decision::Answer => {
            let opener = if request.sentiment == Sentiment::Negative {
                "Open with a sincere apology and reassurance before the solution.\n"
            } else {
                ""
            };
            format!(
                "{opener}Explain the solution step by step using only the retrieved knowledge. \
                 Mention the source documents you used by name ({sources}). \
                 Do not offer to hand the case to a specialist.",
                sources = request.sources.join(", "),
            )
        }
        Decision::Refuse => "The request is outside what this desk supports. Politely explain \
             that you can only help with questions about the product. Do not answer the \
             question, do not give any solution and do not offer to involve a specialist."
            .to_string(),
        Decision::Escalate => "Acknowledge the issue personally and tell the customer a \
             specialist will look into it and follow up shortly. Do not propose any fix or \
             workaround. You may ask for any details that would help the specialist."
            .to_string(),
    }
}

/// Plain-language reading of the judge's category. The internal label itself
/// never goes into the writer's prompt.
fn knowledge_fit(reasoning: Reasoning) -> &'static str {
    match reasoning {
        Reasoning::PerfectMatch => "the retrieved knowledge fully covers this issue",
        Reasoning::PartialMatch => "the retrieved knowledge covers only part of this issue",
        Reasoning::NoMatch => "the retrieved knowledge does not cover this issue",
        Reasoning::OffTopic => "the request is outside the supported product",
        Reasoning::InternalError => "the retrieved knowledge could not be assessed",
    }
}

pub fn generation_prompt(request: &GenerationRequest) -> String {
    format!(
        "Customer issue:\n{issue}\n\n\
         Customer sentiment: {sentiment}\n\
         Reply language: {language}\n\
         Tone: {tone}\n\
         Confidence in the retrieved knowledge: {confidence:.2}\n\
         Knowledge fit: {fit}\n\n\
         Retrieved knowledge:\n{knowledge}\n\n\
         What to write:\n{instructions}\n\n\
         Structure: greeting, acknowledgement, body, warm closing.",
        issue = request.issue_summary,
        sentiment = request.sentiment,
        language = request.language,
        tone = request.tone,
        confidence = request.confidence,
        fit = knowledge_fit(request.reasoning),
        knowledge = request.knowledge_context,
        instructions = decision_instructions(request),
    )
}
