//! Gateway configuration. Load from TOML or env.
//!
//! | Key | Env | Default |
//! |-----|-----|---------|
//! | app_name | PAGI_FINANCE__APP_NAME | Financial Analysis Assistant |
//! | host | PAGI_FINANCE__HOST | 127.0.0.1 |
//! | port | PAGI_FINANCE__PORT | 8000 |
//! | llm_mode | PAGI_FINANCE__LLM_MODE | live ("live" \| "mock") |
//! | model | PAGI_FINANCE__MODEL | gemini-2.0-flash-exp |
//! | api_base_url | PAGI_FINANCE__API_BASE_URL | https://generativelanguage.googleapis.com/v1beta |
//! | verify_remote | PAGI_FINANCE__VERIFY_REMOTE | false |
//! | search_grounding | PAGI_FINANCE__SEARCH_GROUNDING | true |
//! | credential_env | PAGI_FINANCE__CREDENTIAL_ENV | GOOGLE_API_KEY |
//! | session_idle_secs | PAGI_FINANCE__SESSION_IDLE_SECS | 1800 |
//! | max_sessions | PAGI_FINANCE__MAX_SESSIONS | 10000 |

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::{AnalystAgent, LlmMode, MockAgent};
use crate::credential_gate::{Credential, KeyVerifier, LocalVerifier};
use crate::error::ConfigError;
use crate::gemini::{GeminiAgent, GeminiKeyVerifier, DEFAULT_API_BASE, DEFAULT_MODEL};

const ENV_CONFIG_PATH: &str = "PAGI_FINANCE_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/finance.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct FinanceConfig {
    pub app_name: String,
    pub host: String,
    pub port: u16,
    pub llm_mode: String,
    pub model: String,
    pub api_base_url: String,
    #[serde(default)]
    pub verify_remote: bool,
    /// Bind the `google_search` tool on every live run.
    pub search_grounding: bool,
    /// Name of the env var that may pre-populate the credential.
    pub credential_env: String,
    /// Sessions untouched for this long are dropped.
    pub session_idle_secs: u64,
    /// Upper bound on live sessions; the least recently seen is evicted past it.
    pub max_sessions: usize,
}

/// Credential found in the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupCredential {
    Absent,
    Valid(Credential),
    /// Present but fails the format rule; never trusted.
    Invalid,
}

impl StartupCredential {
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            StartupCredential::Valid(c) => Some(c),
            _ => None,
        }
    }
}

impl FinanceConfig {
    /// Precedence: env `PAGI_FINANCE__*` > `$PAGI_FINANCE_CONFIG` (or `config/finance.toml`) > defaults.
    /// Reads `.env` first so both the overrides and the startup credential can live there.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let builder = config::Config::builder()
            .set_default("app_name", "Financial Analysis Assistant")?
            .set_default("host", "127.0.0.1")?
            .set_default("port", 8000_i64)?
            .set_default("llm_mode", "live")?
            .set_default("model", DEFAULT_MODEL)?
            .set_default("api_base_url", DEFAULT_API_BASE)?
            .set_default("verify_remote", false)?
            .set_default("search_grounding", true)?
            .set_default("credential_env", "GOOGLE_API_KEY")?
            .set_default("session_idle_secs", 1800_i64)?
            .set_default("max_sessions", 10_000_i64)?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("PAGI_FINANCE").separator("__"))
            .build()?;

        let cfg: FinanceConfig = built.try_deserialize()?;
        cfg.mode()?;
        Ok(cfg)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let raw = format!("{}:{}", self.host, self.port);
        raw.parse().map_err(|_| ConfigError::BindAddr(raw))
    }

    pub fn mode(&self) -> Result<LlmMode, ConfigError> {
        self.llm_mode.parse().map_err(ConfigError::LlmMode)
    }

    /// Format-check the startup credential from `credential_env`.
    pub fn startup_credential(&self) -> StartupCredential {
        match std::env::var(&self.credential_env) {
            Ok(raw) if !raw.is_empty() => Self::classify_startup(&raw),
            _ => StartupCredential::Absent,
        }
    }

    fn classify_startup(raw: &str) -> StartupCredential {
        match Credential::parse(raw) {
            Ok(c) => StartupCredential::Valid(c),
            Err(_) => StartupCredential::Invalid,
        }
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    /// Live Gemini agent as configured, regardless of `llm_mode`.
    pub fn gemini_agent(&self) -> GeminiAgent {
        GeminiAgent::new(&self.api_base_url, &self.model)
            .with_search_grounding(self.search_grounding)
    }

    /// Agent collaborator for the configured mode.
    pub fn build_agent(&self) -> Result<Arc<dyn AnalystAgent>, ConfigError> {
        Ok(match self.mode()? {
            LlmMode::Live => Arc::new(self.gemini_agent()),
            LlmMode::Mock => Arc::new(MockAgent),
        })
    }

    /// Verification collaborator: live check only when `verify_remote` is set.
    pub fn build_verifier(&self) -> Arc<dyn KeyVerifier> {
        if self.verify_remote {
            Arc::new(GeminiKeyVerifier::new(&self.api_base_url))
        } else {
            Arc::new(LocalVerifier)
        }
    }
}
