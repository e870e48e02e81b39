//! Interface to the generative-AI text service.
//!
//! The service itself is an external collaborator: a prompt plus sampling
//! parameters go in, free text or a call to one of the declared tools comes out.
//! Nothing here retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use crate::model::{AiSettings, Tenant};

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("assistant feature disabled: {0}")]
    Disabled(String),
    /// The service answered with a tool that was never declared.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("text service error: {0}")]
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingConfig {
    pub model: String,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
}

impl From<&AiSettings> for SamplingConfig {
    fn from(settings: &AiSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            top_k: settings.top_k,
            top_p: settings.top_p,
        }
    }
}

/// A tool the model may ask the caller to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Text(String),
    ToolCall { name: String, arguments: serde_json::Value },
}

#[async_trait]
pub trait TextService: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        config: &SamplingConfig,
        tools: &[ToolDeclaration],
    ) -> Result<Completion, AssistantError>;
}

pub struct Assistant<S: TextService> {
    service: S,
    tools: Vec<ToolDeclaration>,
}

impl<S: TextService> Assistant<S> {
    pub fn new(service: S, tools: Vec<ToolDeclaration>) -> Self {
        Self { service, tools }
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    /// Sends `prompt` for `feature` using the sampling parameters and instructions in `settings`.
    pub async fn ask(&self, settings: &AiSettings, feature: &str, prompt: &str) -> Result<Completion, AssistantError> {
        if !settings.feature_enabled(feature) {
            return Err(AssistantError::Disabled(feature.to_string()));
        }

        let prompt = if settings.instructions.trim().is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n\n{}", settings.instructions.trim(), prompt)
        };

        let completion = self.service.complete(&prompt, &SamplingConfig::from(settings), &self.tools).await?;
        if let Completion::ToolCall { name, .. } = &completion {
            if !self.tools.iter().any(|t| &t.name == name) {
                return Err(AssistantError::UnknownTool(name.clone()));
            }
        }
        Ok(completion)
    }
}

/// One-paragraph summary of a tenant, used as prompt context.
pub fn tenant_context(tenant: &Tenant) -> String {
    format!(
        "Store \"{}\" ({}). Products: {}. Sales: {}. Employees: {}. Customers: {}. Open tickets: {}. Balance: {:.2} {}.",
        tenant.name,
        tenant.id,
        tenant.products.len(),
        tenant.sales.len(),
        tenant.employees.len(),
        tenant.customers.len(),
        tenant.tickets.len(),
        tenant.balance(),
        tenant.currency,
    )
}
