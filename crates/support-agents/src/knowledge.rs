//! Knowledge search backends.
//!
//! - [`QdrantKnowledgeSearch`]: embeds the query through the OpenAI-compatible
//!   `/embeddings` endpoint, then runs a vector search against a Qdrant
//!   collection over its REST API.
//! - [`FileKnowledgeBase`]: a JSON file of passages scored by keyword overlap,
//!   for offline runs and tests.
//!
//! Ingestion (OCR, chunking, embedding and storing documents) happens
//! elsewhere; both backends only read.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use triage::CandidateDocument;

use crate::agents::KnowledgeSearch;
use crate::config::{EndpointConfig, KnowledgeConfig};

/// Source identifier used when a point carries no file name.
const UNKNOWN_SOURCE: &str = "Unknown";

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f64,
    #[serde(default)]
    payload: Option<PointPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct PointPayload {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    source_file: Option<String>,
    #[serde(default)]
    meta: Option<PointMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct PointMeta {
    #[serde(default)]
    source_file: Option<String>,
}

impl ScoredPoint {
    fn into_document(self) -> CandidateDocument {
        let payload = self.payload.unwrap_or_default();
        let source = payload
            .source_file
            .or_else(|| payload.meta.and_then(|m| m.source_file))
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string());
        CandidateDocument {
            content: payload.content.unwrap_or_default(),
            source,
            similarity: Some(self.score),
        }
    }
}

/// Vector search over a Qdrant collection.
pub struct QdrantKnowledgeSearch {
    http: reqwest::Client,
    embeddings_url: String,
    api_key: String,
    embedding_model: String,
    search_url: String,
}

impl QdrantKnowledgeSearch {
    pub fn new(endpoint: &EndpointConfig, knowledge: &KnowledgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            embeddings_url: format!("{}/embeddings", endpoint.url.trim_end_matches('/')),
            api_key: endpoint.api_key.clone(),
            embedding_model: knowledge.embedding_model.clone(),
            search_url: format!(
                "{}/collections/{}/points/search",
                knowledge.qdrant_url.trim_end_matches('/'),
                knowledge.collection
            ),
        }
    }

    async fn embed(&self, query: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: vec![query],
        };
        let response = self
            .http
            .post(&self.embeddings_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("embedding endpoint returned HTTP {status}: {body}");
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .context("embedding response was not valid JSON")?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .context("embedding response carried no vectors")
    }
}

#[async_trait]
impl KnowledgeSearch for QdrantKnowledgeSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CandidateDocument>> {
        let vector = self.embed(query).await?;
        let request = SearchRequest {
            vector,
            limit: top_k,
            with_payload: true,
        };

        let response = self
            .http
            .post(&self.search_url)
            .json(&request)
            .send()
            .await
            .context("qdrant search request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("qdrant returned HTTP {status}: {body}");
        }

        let parsed: SearchResponse = response
            .json()
            .await
            .context("qdrant response was not valid JSON")?;
        debug!(hits = parsed.result.len(), "qdrant search complete");
        Ok(parsed
            .result
            .into_iter()
            .map(ScoredPoint::into_document)
            .collect())
    }
}

/// Check that the configured Qdrant collection exists.
pub async fn check_collection(knowledge: &KnowledgeConfig) -> bool {
    let url = format!(
        "{}/collections/{}",
        knowledge.qdrant_url.trim_end_matches('/'),
        knowledge.collection
    );
    match reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// One passage in a knowledge file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub content: String,
    pub source: String,
}

/// Passages loaded from a JSON array, scored by keyword overlap.
#[derive(Debug, Clone, Default)]
pub struct FileKnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}

impl FileKnowledgeBase {
    pub fn new(entries: Vec<KnowledgeEntry>) -> Self {
        Self { entries }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let entries: Vec<KnowledgeEntry> =
            serde_json::from_str(&content).context("Failed to parse knowledge file JSON")?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fraction of distinct query terms present in each passage, best first.
    fn rank(&self, query: &str, top_k: usize) -> Vec<CandidateDocument> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(f64, &KnowledgeEntry)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let entry_terms = terms(&entry.content);
                let hits = query_terms.intersection(&entry_terms).count();
                (hits > 0).then(|| (hits as f64 / query_terms.len() as f64, entry))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| CandidateDocument {
                content: entry.content.clone(),
                source: entry.source.clone(),
                similarity: Some(score),
            })
            .collect()
    }
}

#[async_trait]
impl KnowledgeSearch for FileKnowledgeBase {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CandidateDocument>> {
        Ok(self.rank(query, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kb() -> FileKnowledgeBase {
        FileKnowledgeBase::new(vec![
            KnowledgeEntry {
                content: "To reset your password open Settings and click Forgot password.".into(),
                source: "account_guide.pdf".into(),
            },
            KnowledgeEntry {
                content: "Invoices are available under Billing > History.".into(),
                source: "billing_faq.pdf".into(),
            },
            KnowledgeEntry {
                content: "Password rules: at least 12 characters.".into(),
                source: "security_policy.pdf".into(),
            },
        ])
    }

    #[tokio::test]
    async fn keyword_overlap_ranks_best_first() {
        let docs = kb().search("reset password", 5).await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].source, "account_guide.pdf");
        assert_eq!(docs[0].similarity, Some(1.0));
        assert_eq!(docs[1].similarity, Some(0.5));
    }

    #[tokio::test]
    async fn top_k_limits_results() {
        let docs = kb().search("reset password", 1).await.unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[tokio::test]
    async fn unrelated_query_returns_nothing() {
        let docs = kb().search("who won the world cup", 5).await.unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.json");
        std::fs::write(
            &path,
            r#"[{"content": "Export data from the Reports tab.", "source": "reports.pdf"}]"#,
        )
        .unwrap();
        let kb = FileKnowledgeBase::from_file(&path).unwrap();
        assert_eq!(kb.len(), 1);
        assert!(FileKnowledgeBase::from_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn qdrant_point_reads_nested_source() {
        let point: ScoredPoint = serde_json::from_str(
            r#"{"id": 1, "score": 0.83, "payload": {"content": "Step 1", "meta": {"source_file": "guide.pdf"}}}"#,
        )
        .unwrap();
        let doc = point.into_document();
        assert_eq!(doc.source, "guide.pdf");
        assert_eq!(doc.similarity, Some(0.83));

        let point: ScoredPoint = serde_json::from_str(r#"{"id": 2, "score": 0.1}"#).unwrap();
        assert_eq!(point.into_document().source, UNKNOWN_SOURCE);
    }
}
