//! Ticket analyst agent: sentiment, keywords, language, optional summary.

use anyhow::Result;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use crate::config::RoleModel;
use crate::prompts;

use super::{AnalysisRequest, LanguageUnderstanding, OaiAgent};

/// Build the analyst agent.
///
/// NO tools. Returns a single JSON object per ticket.
pub fn build_analyst(client: &openai::CompletionsClient, role: &RoleModel) -> OaiAgent {
    client
        .agent(&role.model)
        .name("analyst")
        .description("Extracts sentiment, keywords, language and summary from a support ticket")
        .preamble(prompts::ANALYST_PREAMBLE)
        .temperature(role.temperature)
        .build()
}

pub struct RigAnalyst {
    agent: OaiAgent,
}

impl RigAnalyst {
    pub fn new(client: &openai::CompletionsClient, role: &RoleModel) -> Self {
        Self {
            agent: build_analyst(client, role),
        }
    }
}

#[async_trait]
impl LanguageUnderstanding for RigAnalyst {
    async fn understand(&self, request: &AnalysisRequest) -> Result<String> {
        let prompt = prompts::analysis_prompt(request);
        let response: String = self.agent.prompt(prompt.as_str()).await?;
        Ok(response)
    }
}
