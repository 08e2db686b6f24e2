//! PAGI Finance: Core library.
//! Credential Gate, session record and Query Dispatcher for the Financial Analysis Assistant.

pub mod agent;
pub mod config;
pub mod credential_gate;
pub mod dispatcher;
pub mod error;
pub mod gemini;
pub mod prompts;
pub mod session;

pub use agent::{AnalystAgent, LlmMode, MockAgent};
pub use config::{FinanceConfig, StartupCredential};
pub use credential_gate::{is_valid_key_format, Credential, CredentialGate, GateResult, KeyVerifier, LocalVerifier};
pub use dispatcher::{is_credential_suspect, AnalysisReport, AnalysisRequest, AnalysisResult, QueryDispatcher};
pub use error::{AgentError, AnalysisError, ConfigError, GateRejection};
pub use gemini::{GeminiAgent, GeminiKeyVerifier};
pub use session::{CredentialState, Session};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
