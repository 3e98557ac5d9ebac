//! Judge agent: topic-relevance gate and solution-quality scoring.
//!
//! One agent serves both phases. The gate prompt never contains retrieved
//! documents; the scoring prompt is only sent for on-topic tickets.

use anyhow::Result;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use crate::config::{ProductConfig, RoleModel};
use crate::prompts;

use super::{Judgment, OaiAgent, SolutionAssessment, TicketContext};

/// Build the judge agent scoped to `product`.
pub fn build_judge(
    client: &openai::CompletionsClient,
    role: &RoleModel,
    product: &ProductConfig,
) -> OaiAgent {
    let preamble = prompts::judge_preamble(product);
    client
        .agent(&role.model)
        .name("judge")
        .description("Scores retrieved knowledge against a support ticket. Returns JSON only.")
        .preamble(&preamble)
        .temperature(role.temperature)
        .build()
}

pub struct RigJudge {
    agent: OaiAgent,
}

impl RigJudge {
    pub fn new(client: &openai::CompletionsClient, role: &RoleModel, product: &ProductConfig) -> Self {
        Self {
            agent: build_judge(client, role, product),
        }
    }
}

#[async_trait]
impl Judgment for RigJudge {
    async fn assess_topic(&self, context: &TicketContext) -> Result<String> {
        let prompt = prompts::topic_prompt(context);
        let response: String = self.agent.prompt(prompt.as_str()).await?;
        Ok(response)
    }

    async fn assess_solution(&self, assessment: &SolutionAssessment) -> Result<String> {
        let prompt = prompts::solution_prompt(assessment);
        let response: String = self.agent.prompt(prompt.as_str()).await?;
        Ok(response)
    }
}
