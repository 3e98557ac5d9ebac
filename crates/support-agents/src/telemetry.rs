//! Per-turn telemetry.
//!
//! One JSON object per completed turn, appended to the configured JSONL file.
//! Records never carry ticket text: the description is represented by a
//! blake3 digest and its length.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use triage::{Decision, EscalationCause, Reasoning, SessionId, Stage};

use crate::prompts::PROMPT_VERSION;

/// Wall-clock milliseconds spent in each stage. Absent when the stage did not run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageTimings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition_ms: Option<u64>,
}

impl StageTimings {
    pub fn record(&mut self, stage: Stage, elapsed: Duration) {
        let ms = Some(elapsed.as_millis() as u64);
        match stage {
            Stage::Analysis => self.analysis_ms = ms,
            Stage::Retrieval => self.retrieval_ms = ms,
            Stage::Evaluation => self.evaluation_ms = ms,
            Stage::Composition => self.composition_ms = ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub timestamp: String,
    pub session_id: SessionId,
    pub ticket_id: String,
    pub turn: u32,
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation: Option<EscalationCause>,
    pub stages: StageTimings,
    /// blake3 of the redacted description, hex.
    pub description_digest: String,
    pub description_len: usize,
    /// PII instances replaced in this turn's ticket.
    pub redactions: usize,
    pub prompt_version: String,
}

/// Hex blake3 digest used to correlate tickets without storing their text.
pub fn digest(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

impl TurnMetrics {
    pub fn new(session_id: SessionId, ticket_id: &str, turn: u32, decision: Decision) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            session_id,
            ticket_id: ticket_id.to_string(),
            turn,
            decision,
            confidence: None,
            reasoning: None,
            escalation: None,
            stages: StageTimings::default(),
            description_digest: String::new(),
            description_len: 0,
            redactions: 0,
            prompt_version: PROMPT_VERSION.to_string(),
        }
    }

    pub fn with_description(mut self, redacted: &str) -> Self {
        self.description_digest = digest(redacted);
        self.description_len = redacted.chars().count();
        self
    }
}

/// Append-only JSONL sink.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    path: PathBuf,
}

impl TelemetrySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. Failures are logged, never propagated.
    pub fn append(&self, metrics: &TurnMetrics) {
        match serde_json::to_string(metrics) {
            Ok(json) => {
                use std::io::Write;
                match std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                {
                    Ok(mut file) => {
                        if let Err(e) = writeln!(file, "{json}") {
                            warn!("Failed to append turn telemetry: {e}");
                        } else {
                            debug!(path = %self.path.display(), "Appended turn telemetry");
                        }
                    }
                    Err(e) => warn!("Failed to open telemetry file: {e}"),
                }
            }
            Err(e) => warn!("Failed to serialize turn telemetry: {e}"),
        }
    }
}

/// Read every parseable record from a telemetry file. Bad lines are skipped.
pub fn read_metrics(path: &Path) -> Vec<TurnMetrics> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!("Skipping malformed telemetry line: {e}");
                None
            }
        })
        .collect()
}
