//! Reply writer agent.

use anyhow::Result;
use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use crate::config::{ProductConfig, RoleModel};
use crate::prompts;

use super::{Generation, GenerationRequest, OaiAgent};

/// Build the writer agent.
///
/// NO tools. Returns plain-text email bodies.
pub fn build_writer(
    client: &openai::CompletionsClient,
    role: &RoleModel,
    product: &ProductConfig,
) -> OaiAgent {
    let preamble = prompts::writer_preamble(product);
    client
        .agent(&role.model)
        .name("writer")
        .description("Writes the customer-facing reply in the customer's language")
        .preamble(&preamble)
        .temperature(role.temperature)
        .build()
}

pub struct RigWriter {
    agent: OaiAgent,
}

impl RigWriter {
    pub fn new(client: &openai::CompletionsClient, role: &RoleModel, product: &ProductConfig) -> Self {
        Self {
            agent: build_writer(client, role, product),
        }
    }
}

#[async_trait]
impl Generation for RigWriter {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let prompt = prompts::generation_prompt(request);
        let response: String = self.agent.prompt(prompt.as_str()).await?;
        Ok(response)
    }
}
