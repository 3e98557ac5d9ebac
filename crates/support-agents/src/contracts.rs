//! Structured output contracts for the language capabilities.
//!
//! Every capability that must return structured data is decoded into one of
//! the payloads below before anything else reads it. Decoding is strict:
//! one plain parse, then a single retry after stripping incidental
//! formatting (code fences, leading prose). Anything else is malformed and
//! the stage fails closed.
//!
//! ```text
//! AnalysisPayload  { sentiment, keywords[], language, summary|null }
//! TopicVerdict     { on_topic, explanation }
//! JudgmentPayload  { confidence_score, reasoning, explanation }
//! ```

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Language-understanding output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisPayload {
    /// One of `positive`, `neutral`, `negative`.
    pub sentiment: String,
    pub keywords: Vec<String>,
    /// Name of the language the customer wrote in, e.g. `English`.
    pub language: String,
    /// Only for long descriptions, otherwise null.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Topic-relevance gate output. Produced without seeing any documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TopicVerdict {
    pub on_topic: bool,
    #[serde(default)]
    pub explanation: String,
}

/// Solution-quality scoring output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JudgmentPayload {
    /// 1.0 complete solution, 0.5 partial, 0.0 irrelevant.
    pub confidence_score: f64,
    /// One of `perfect_match`, `partial_match`, `no_match`.
    pub reasoning: String,
    #[serde(default)]
    pub explanation: String,
}

/// Pretty-printed JSON schema for `T`, embedded in prompts.
pub fn schema_hint<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schemars::schema_for!(T)).unwrap_or_default()
}

/// Decode a capability response into `T`.
///
/// Tries the trimmed text first. On failure, strips formatting markers once
/// and tries again. Returns the last parse error when both attempts fail.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let trimmed = raw.trim();
    match serde_json::from_str::<T>(trimmed) {
        Ok(value) => Ok(value),
        Err(first) => match strip_markers(trimmed) {
            Some(inner) if inner != trimmed => serde_json::from_str::<T>(inner),
            _ => Err(first),
        },
    }
}

/// Extract the JSON object from a response that may carry fences or prose.
fn strip_markers(text: &str) -> Option<&str> {
    // ```json ... ``` first, then any ``` ... ``` fence
    for fence in ["```json", "```JSON", "```"] {
        if let Some(start) = text.find(fence) {
            let body_start = start + fence.len();
            if let Some(end) = text[body_start..].find("```") {
                return Some(text[body_start..body_start + end].trim());
            }
        }
    }

    // First { to last }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_json_decodes() {
        let payload: AnalysisPayload = decode(
            r#"{"sentiment":"negative","keywords":["password","reset"],"language":"English","summary":null}"#,
        )
        .unwrap();
        assert_eq!(payload.keywords, vec!["password", "reset"]);
        assert_eq!(payload.summary, None);
    }

    #[test]
    fn fenced_json_decodes_after_strip() {
        let raw = "```json\n{\"on_topic\": false, \"explanation\": \"sports trivia\"}\n```";
        let verdict: TopicVerdict = decode(raw).unwrap();
        assert!(!verdict.on_topic);
    }

    #[test]
    fn bare_fence_and_prose_are_stripped() {
        let raw = "Here you go:\n```\n{\"confidence_score\": 0.5, \"reasoning\": \"partial_match\"}\n```";
        let judgment: JudgmentPayload = decode(raw).unwrap();
        assert_eq!(judgment.confidence_score, 0.5);
        assert_eq!(judgment.explanation, "");

        let raw = "Sure! {\"confidence_score\": 1.0, \"reasoning\": \"perfect_match\"} Hope it helps.";
        let judgment: JudgmentPayload = decode(raw).unwrap();
        assert_eq!(judgment.reasoning, "perfect_match");
    }

    #[test]
    fn missing_required_field_is_malformed() {
        let raw = r#"{"sentiment":"neutral","language":"English"}"#;
        assert!(decode::<AnalysisPayload>(raw).is_err());
    }

    #[test]
    fn prose_without_json_is_malformed() {
        assert!(decode::<TopicVerdict>("The query looks fine to me.").is_err());
        assert!(decode::<TopicVerdict>("").is_err());
    }

    #[test]
    fn schema_hint_names_fields() {
        let hint = schema_hint::<JudgmentPayload>();
        assert!(hint.contains("confidence_score"));
        assert!(hint.contains("reasoning"));
    }
}
