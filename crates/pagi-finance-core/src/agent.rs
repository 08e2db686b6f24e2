//! Agent collaborator seam: a hosted model that turns a prompt into report text.

use async_trait::async_trait;

use crate::credential_gate::Credential;
use crate::error::AgentError;

/// Mode for LLM invocation: mock (deterministic offline report) or live (Gemini API).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LlmMode {
    #[default]
    Live,
    Mock,
}

impl std::str::FromStr for LlmMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" | "gemini" => Ok(LlmMode::Live),
            "mock" => Ok(LlmMode::Mock),
            other => Err(other.to_string()),
        }
    }
}

/// External agent: one blocking call per prompt, credential passed explicitly.
#[async_trait]
pub trait AnalystAgent: Send + Sync {
    async fn run(&self, credential: &Credential, prompt: &str) -> Result<String, AgentError>;
}

/// Offline stand-in that echoes the prompt inside a fixed markdown report.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockAgent;

#[async_trait]
impl AnalystAgent for MockAgent {
    async fn run(&self, _credential: &Credential, prompt: &str) -> Result<String, AgentError> {
        tracing::debug!(len = prompt.len(), "[FINANCE AGENT] Mock run");
        Ok(format!(
            "## Executive Summary\n\n\
             [Generated – Mock LLM] No live market data was consulted.\n\n\
             > {}\n\n\
             | Metric | Value |\n\
             |--------|-------|\n\
             | Latest price | n/a |\n\
             | 52-week range | n/a |\n\n\
             **Risk disclosure:** mock output, not investment advice.",
            prompt
        ))
    }
}
