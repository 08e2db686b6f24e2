//! Error types for PAGI Finance.

use thiserror::Error;

/// Why the Credential Gate refused a credential.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    #[error("Invalid API key format. Please check your API key.")]
    InvalidFormat,

    #[error("API key validation failed. Please check your key.")]
    VerificationFailed,
}

/// Failures surfaced by the Query Dispatcher. All are recovered at the handler boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Please enter a stock ticker symbol.")]
    EmptyTicker,

    #[error("No response received from the agent.")]
    EmptyResponse,

    /// `credential_suspect` is set when the collaborator's message points at the credential.
    #[error("An error occurred during analysis: {message}")]
    AgentFailure {
        message: String,
        credential_suspect: bool,
    },
}

impl AnalysisError {
    /// True when the caller should offer (not force) a credential reset.
    pub fn credential_suspect(&self) -> bool {
        matches!(
            self,
            AnalysisError::AgentFailure {
                credential_suspect: true,
                ..
            }
        )
    }
}

/// Errors raised by the hosted model collaborators.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Gemini request: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Gemini response parse: {0}")]
    Parse(String),
}

/// Errors loading [`crate::FinanceConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid bind address {0}")]
    BindAddr(String),

    #[error("Unknown llm_mode '{0}'; expected one of: live, mock")]
    LlmMode(String),
}
