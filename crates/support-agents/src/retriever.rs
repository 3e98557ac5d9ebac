//! Retrieval stage: analysis → candidate documents.

use std::sync::Arc;

use triage::{AnalysisResult, CandidateDocument, RetrievalResult, Stage, StageError};

use crate::agents::KnowledgeSearch;

pub struct Retriever {
    search: Arc<dyn KnowledgeSearch>,
    top_k: usize,
}

/// Search query for an analysis: keywords, then the summary when present.
pub fn build_query(analysis: &AnalysisResult) -> String {
    let mut query = analysis.keywords.join(" ");
    if let Some(summary) = &analysis.summary {
        query.push(' ');
        query.push_str(summary);
    }
    query
}

impl Retriever {
    pub fn new(search: Arc<dyn KnowledgeSearch>, top_k: usize) -> Self {
        Self { search, top_k }
    }

    /// An empty result is a valid outcome, not a failure.
    pub async fn retrieve(&self, analysis: &AnalysisResult) -> Result<RetrievalResult, StageError> {
        let query = build_query(analysis);
        let documents = self
            .search
            .search(&query, self.top_k)
            .await
            .map_err(|e| StageError::remote(Stage::Retrieval, format!("{e:#}")))?;

        let documents: Vec<CandidateDocument> = documents
            .into_iter()
            .take(self.top_k)
            .map(|mut doc| {
                doc.similarity = doc
                    .similarity
                    .filter(|s| s.is_finite())
                    .map(|s| s.clamp(0.0, 1.0));
                doc
            })
            .collect();

        tracing::debug!(hits = documents.len(), "retrieval complete");
        Ok(RetrievalResult::new(query, documents))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use triage::{FailureKind, Sentiment};

    #[derive(Default)]
    struct FixedSearch {
        documents: Vec<CandidateDocument>,
        fail: bool,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl KnowledgeSearch for FixedSearch {
        async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CandidateDocument>> {
            self.queries.lock().unwrap().push((query.to_string(), top_k));
            if self.fail {
                anyhow::bail!("qdrant unavailable");
            }
            Ok(self.documents.clone())
        }
    }

    fn analysis(summary: Option<&str>) -> AnalysisResult {
        AnalysisResult {
            ticket_id: "T-1".into(),
            sentiment: Sentiment::Neutral,
            keywords: vec!["password".into(), "reset".into()],
            language: "English".into(),
            summary: summary.map(String::from),
        }
    }

    fn doc(source: &str, similarity: Option<f64>) -> CandidateDocument {
        CandidateDocument {
            content: format!("from {source}"),
            source: source.into(),
            similarity,
        }
    }

    #[test]
    fn query_joins_keywords_and_summary() {
        assert_eq!(build_query(&analysis(None)), "password reset");
        assert_eq!(
            build_query(&analysis(Some("cannot log in"))),
            "password reset cannot log in"
        );
    }

    #[tokio::test]
    async fn retrieval_truncates_and_sanitizes_scores() {
        let search = Arc::new(FixedSearch {
            documents: vec![
                doc("a.pdf", Some(1.4)),
                doc("b.pdf", Some(f64::NAN)),
                doc("a.pdf", Some(-0.2)),
                doc("c.pdf", Some(0.3)),
            ],
            ..Default::default()
        });
        let retriever = Retriever::new(search.clone(), 3);
        let result = retriever.retrieve(&analysis(None)).await.unwrap();

        assert_eq!(result.documents.len(), 3);
        assert_eq!(result.documents[0].similarity, Some(1.0));
        assert_eq!(result.documents[1].similarity, None);
        assert_eq!(result.documents[2].similarity, Some(0.0));
        assert_eq!(result.sources, vec!["a.pdf", "b.pdf"]);
        assert_eq!(result.query, "password reset");
        assert_eq!(search.queries.lock().unwrap()[0].1, 3);
    }

    #[tokio::test]
    async fn empty_search_is_not_an_error() {
        let retriever = Retriever::new(Arc::new(FixedSearch::default()), 5);
        let result = retriever.retrieve(&analysis(None)).await.unwrap();
        assert!(result.is_empty());
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_remote() {
        let search = Arc::new(FixedSearch {
            fail: true,
            ..Default::default()
        });
        let err = Retriever::new(search, 5)
            .retrieve(&analysis(None))
            .await
            .unwrap_err();
        assert_eq!(err.stage(), Stage::Retrieval);
        assert_eq!(err.kind(), FailureKind::Remote);
    }
}
