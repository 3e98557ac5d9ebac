//! Capability seams and their rig-backed implementations.
//!
//! The pipeline talks to four narrow capabilities. Each is a trait so the
//! orchestrator receives explicitly constructed instances, and tests can
//! script them. `AgentFactory` builds the production set from a
//! `SupportConfig`.

pub mod analyst;
pub mod judge;
pub mod writer;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rig::agent::Agent;
use rig::providers::openai;
use serde::Serialize;
use triage::{AnalysisResult, CandidateDocument, Decision, Reasoning, Sentiment, Ticket};

use crate::config::{KnowledgeBackend, SupportConfig};
use crate::knowledge::{FileKnowledgeBase, QdrantKnowledgeSearch};

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// Input to language understanding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    pub subject: String,
    pub category: String,
    pub description: String,
}

impl AnalysisRequest {
    pub fn from_ticket(ticket: &Ticket) -> Self {
        Self {
            subject: ticket.subject.clone(),
            category: ticket.category.clone(),
            description: ticket.description.clone(),
        }
    }
}

/// What the judge knows about the ticket. Never includes documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketContext {
    pub subject: String,
    pub category: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub summary: Option<String>,
}

impl TicketContext {
    pub fn new(ticket: &Ticket, analysis: &AnalysisResult) -> Self {
        Self {
            subject: ticket.subject.clone(),
            category: ticket.category.clone(),
            description: ticket.description.clone(),
            keywords: analysis.keywords.clone(),
            summary: analysis.summary.clone(),
        }
    }
}

/// Input to solution-quality scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionAssessment {
    pub context: TicketContext,
    pub documents: Vec<CandidateDocument>,
    pub aggregate_similarity: Option<f64>,
}

/// Input to reply generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub decision: Decision,
    pub issue_summary: String,
    pub sentiment: Sentiment,
    /// Numbered, trimmed document excerpts.
    pub knowledge_context: String,
    pub sources: Vec<String>,
    pub confidence: f64,
    /// Category only. The judge's explanation is never passed on.
    pub reasoning: Reasoning,
    pub language: String,
    pub tone: String,
}

/// Sentiment, keywords, language and summary extraction.
#[async_trait]
pub trait LanguageUnderstanding: Send + Sync {
    /// Raw capability text, expected to carry an `AnalysisPayload`.
    async fn understand(&self, request: &AnalysisRequest) -> Result<String>;
}

/// Candidate passages from the knowledge base.
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CandidateDocument>>;
}

/// Scores retrieved material against the query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Judgment: Send + Sync {
    /// Topic-relevance gate. Raw text carrying a `TopicVerdict`.
    async fn assess_topic(&self, context: &TicketContext) -> Result<String>;

    /// Solution quality. Raw text carrying a `JudgmentPayload`.
    async fn assess_solution(&self, assessment: &SolutionAssessment) -> Result<String>;
}

/// Customer-facing prose.
#[async_trait]
pub trait Generation: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// The four capabilities the orchestrator is built from.
#[derive(Clone)]
pub struct Capabilities {
    pub understanding: Arc<dyn LanguageUnderstanding>,
    pub search: Arc<dyn KnowledgeSearch>,
    pub judgment: Arc<dyn Judgment>,
    pub generation: Arc<dyn Generation>,
}

/// Builds the production capability set from a `SupportConfig`.
pub struct AgentFactory {
    pub client: openai::CompletionsClient,
    pub config: SupportConfig,
}

impl AgentFactory {
    pub fn new(config: &SupportConfig) -> Result<Self> {
        let client = config.completions_client()?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn build_analyst(&self) -> analyst::RigAnalyst {
        analyst::RigAnalyst::new(&self.client, &self.config.endpoint.analyst)
    }

    pub fn build_judge(&self) -> judge::RigJudge {
        judge::RigJudge::new(
            &self.client,
            &self.config.endpoint.judge,
            &self.config.product,
        )
    }

    pub fn build_writer(&self) -> writer::RigWriter {
        writer::RigWriter::new(
            &self.client,
            &self.config.endpoint.writer,
            &self.config.product,
        )
    }

    pub fn build_search(&self) -> Result<Arc<dyn KnowledgeSearch>> {
        let knowledge = &self.config.knowledge;
        Ok(match knowledge.backend {
            KnowledgeBackend::Qdrant => Arc::new(QdrantKnowledgeSearch::new(
                &self.config.endpoint,
                knowledge,
            )),
            KnowledgeBackend::File => {
                let path = knowledge
                    .file
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("knowledge.file is not set"))?;
                Arc::new(FileKnowledgeBase::from_file(path)?)
            }
        })
    }

    pub fn build_capabilities(&self) -> Result<Capabilities> {
        Ok(Capabilities {
            understanding: Arc::new(self.build_analyst()),
            search: self.build_search()?,
            judgment: Arc::new(self.build_judge()),
            generation: Arc::new(self.build_writer()),
        })
    }
}
