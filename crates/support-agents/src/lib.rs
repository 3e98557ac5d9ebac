//! Support ticket resolution pipeline.
//!
//! Wires the deterministic core in `triage` to language services: rig agents
//! for analysis, judgment and reply writing, and an HTTP knowledge search.
//! The [`orchestrator::Orchestrator`] runs each turn and owns session state.

pub mod agents;
pub mod analyzer;
pub mod composer;
pub mod config;
pub mod contracts;
pub mod evaluator;
pub mod knowledge;
pub mod orchestrator;
pub mod prompts;
pub mod retriever;
pub mod telemetry;

pub use agents::{AgentFactory, Capabilities};
pub use config::SupportConfig;
pub use orchestrator::{FeedbackOutcome, Orchestrator, TurnOutcome};
