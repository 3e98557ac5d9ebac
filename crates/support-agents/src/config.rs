//! Pipeline configuration.
//!
//! Values resolve in three layers: built-in defaults, then an optional TOML
//! file, then `SUPPORT_*` environment variables. [`SupportConfig::validate`]
//! runs after all layers are applied.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use rig::providers::openai;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use triage::{DecisionPolicy, PiiPolicy, Stage};

pub const ENV_API_URL: &str = "SUPPORT_API_URL";
pub const ENV_API_KEY: &str = "SUPPORT_API_KEY";
pub const ENV_ANALYST_MODEL: &str = "SUPPORT_ANALYST_MODEL";
pub const ENV_JUDGE_MODEL: &str = "SUPPORT_JUDGE_MODEL";
pub const ENV_WRITER_MODEL: &str = "SUPPORT_WRITER_MODEL";
pub const ENV_KNOWLEDGE_BACKEND: &str = "SUPPORT_KNOWLEDGE_BACKEND";
pub const ENV_QDRANT_URL: &str = "SUPPORT_QDRANT_URL";
pub const ENV_QDRANT_COLLECTION: &str = "SUPPORT_QDRANT_COLLECTION";
pub const ENV_EMBEDDING_MODEL: &str = "SUPPORT_EMBEDDING_MODEL";
pub const ENV_KNOWLEDGE_FILE: &str = "SUPPORT_KNOWLEDGE_FILE";
pub const ENV_TOP_K: &str = "SUPPORT_TOP_K";
pub const ENV_ANSWER_THRESHOLD: &str = "SUPPORT_ANSWER_THRESHOLD";
pub const ENV_REFUSE_THRESHOLD: &str = "SUPPORT_REFUSE_THRESHOLD";
pub const ENV_MAX_TURNS: &str = "SUPPORT_MAX_TURNS";
pub const ENV_PII_POLICY: &str = "SUPPORT_PII_POLICY";
pub const ENV_PRODUCT_NAME: &str = "SUPPORT_PRODUCT_NAME";
pub const ENV_TELEMETRY_PATH: &str = "SUPPORT_TELEMETRY_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Model name and sampling temperature for one agent role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleModel {
    pub model: String,
    pub temperature: f64,
}

impl RoleModel {
    fn new(model: &str, temperature: f64) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

/// OpenAI-compatible inference endpoint shared by all roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub url: String,
    pub api_key: String,
    pub analyst: RoleModel,
    pub judge: RoleModel,
    pub writer: RoleModel,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: "https://api.mistral.ai/v1".into(),
            api_key: "not-needed".into(),
            analyst: RoleModel::new("mistral-small-latest", 0.2),
            judge: RoleModel::new("mistral-small-latest", 0.1),
            writer: RoleModel::new("mistral-small-latest", 0.2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeBackend {
    #[default]
    Qdrant,
    File,
}

impl FromStr for KnowledgeBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "file" => Ok(Self::File),
            other => Err(format!("unknown knowledge backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    pub backend: KnowledgeBackend,
    pub qdrant_url: String,
    pub collection: String,
    /// Model used for query embeddings on the inference endpoint.
    pub embedding_model: String,
    /// JSON knowledge file for the `file` backend.
    pub file: Option<PathBuf>,
    pub top_k: usize,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: KnowledgeBackend::Qdrant,
            qdrant_url: "http://localhost:6333".into(),
            collection: "support_docs".into(),
            embedding_model: "mistral-embed".into(),
            file: None,
            top_k: 5,
        }
    }
}

/// Per-stage timeouts in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub analysis_secs: u64,
    pub retrieval_secs: u64,
    pub evaluation_secs: u64,
    pub composition_secs: u64,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            analysis_secs: 30,
            retrieval_secs: 15,
            evaluation_secs: 30,
            composition_secs: 60,
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        let secs = match stage {
            Stage::Analysis => self.analysis_secs,
            Stage::Retrieval => self.retrieval_secs,
            Stage::Evaluation => self.evaluation_secs,
            Stage::Composition => self.composition_secs,
        };
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Descriptions shorter than this never carry a summary.
    pub summary_min_chars: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            summary_min_chars: 280,
        }
    }
}

/// The product the desk supports. Drives the topic gate and refusals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductConfig {
    pub name: String,
    pub description: String,
    pub topics: Vec<String>,
}

impl Default for ProductConfig {
    fn default() -> Self {
        Self {
            name: "Doxa".into(),
            description: "a software product".into(),
            topics: vec![
                "account issues".into(),
                "features".into(),
                "billing".into(),
                "technical troubleshooting".into(),
            ],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportConfig {
    pub endpoint: EndpointConfig,
    pub knowledge: KnowledgeConfig,
    pub policy: DecisionPolicy,
    pub timeouts: StageTimeouts,
    pub analysis: AnalysisConfig,
    pub product: ProductConfig,
    pub telemetry_path: Option<PathBuf>,
}

fn parse_var<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Env { var, value }),
    }
}

impl SupportConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `SUPPORT_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_API_URL) {
            self.endpoint.url = v;
        }
        if let Some(v) = lookup(ENV_API_KEY) {
            self.endpoint.api_key = v;
        }
        if let Some(v) = lookup(ENV_ANALYST_MODEL) {
            self.endpoint.analyst.model = v;
        }
        if let Some(v) = lookup(ENV_JUDGE_MODEL) {
            self.endpoint.judge.model = v;
        }
        if let Some(v) = lookup(ENV_WRITER_MODEL) {
            self.endpoint.writer.model = v;
        }
        if let Some(v) = lookup(ENV_KNOWLEDGE_BACKEND) {
            self.knowledge.backend = parse_var(ENV_KNOWLEDGE_BACKEND, v)?;
        }
        if let Some(v) = lookup(ENV_QDRANT_URL) {
            self.knowledge.qdrant_url = v;
        }
        if let Some(v) = lookup(ENV_QDRANT_COLLECTION) {
            self.knowledge.collection = v;
        }
        if let Some(v) = lookup(ENV_EMBEDDING_MODEL) {
            self.knowledge.embedding_model = v;
        }
        if let Some(v) = lookup(ENV_KNOWLEDGE_FILE) {
            self.knowledge.file = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup(ENV_TOP_K) {
            self.knowledge.top_k = parse_var(ENV_TOP_K, v)?;
        }
        if let Some(v) = lookup(ENV_ANSWER_THRESHOLD) {
            self.policy.answer_threshold = parse_var(ENV_ANSWER_THRESHOLD, v)?;
        }
        if let Some(v) = lookup(ENV_REFUSE_THRESHOLD) {
            self.policy.refuse_threshold = parse_var(ENV_REFUSE_THRESHOLD, v)?;
        }
        if let Some(v) = lookup(ENV_MAX_TURNS) {
            self.policy.max_turns = parse_var(ENV_MAX_TURNS, v)?;
        }
        if let Some(v) = lookup(ENV_PII_POLICY) {
            self.policy.pii_policy = parse_var::<PiiPolicy>(ENV_PII_POLICY, v)?;
        }
        if let Some(v) = lookup(ENV_PRODUCT_NAME) {
            self.product.name = v;
        }
        if let Some(v) = lookup(ENV_TELEMETRY_PATH) {
            self.telemetry_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.url is empty".into()));
        }
        for (role, rm) in [
            ("analyst", &self.endpoint.analyst),
            ("judge", &self.endpoint.judge),
            ("writer", &self.endpoint.writer),
        ] {
            if rm.model.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("endpoint.{role}.model is empty")));
            }
            if !(0.0..=2.0).contains(&rm.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "endpoint.{role}.temperature must be in [0, 2], got {}",
                    rm.temperature
                )));
            }
        }

        if self.knowledge.top_k == 0 {
            return Err(ConfigError::Invalid("knowledge.top_k must be > 0".into()));
        }
        if self.knowledge.backend == KnowledgeBackend::File && self.knowledge.file.is_none() {
            return Err(ConfigError::Invalid(
                "knowledge.file is required for the file backend".into(),
            ));
        }

        let t = &self.timeouts;
        if [
            t.analysis_secs,
            t.retrieval_secs,
            t.evaluation_secs,
            t.composition_secs,
        ]
        .contains(&0)
        {
            return Err(ConfigError::Invalid("stage timeouts must be > 0".into()));
        }

        if self.product.name.trim().is_empty() || self.product.topics.is_empty() {
            return Err(ConfigError::Invalid(
                "product.name and product.topics are required".into(),
            ));
        }
        Ok(())
    }

    /// Build the rig client for the inference endpoint.
    pub fn completions_client(&self) -> anyhow::Result<openai::CompletionsClient> {
        openai::CompletionsClient::builder()
            .api_key(&self.endpoint.api_key)
            .base_url(&self.endpoint.url)
            .build()
            .context("Failed to build inference client")
    }
}

/// Check if an OpenAI-compatible endpoint answers `GET {url}/models`.
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{}/models", url.trim_end_matches('/'));
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
