//! Gemini bridge: generateContent client and live key verifier (reqwest only).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::AnalystAgent;
use crate::credential_gate::{Credential, KeyVerifier};
use crate::error::AgentError;
use crate::prompts;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct GoogleSearch {}

#[derive(Serialize)]
struct Tool {
    google_search: GoogleSearch,
}

/// generateContent request body.
#[derive(Serialize)]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn trim_base(base: &str) -> String {
    base.trim_end_matches('/').to_string()
}

/// Financial analyst agent backed by the Gemini generateContent endpoint.
#[derive(Clone)]
pub struct GeminiAgent {
    client: reqwest::Client,
    api_base: String,
    model: String,
    search_grounding: bool,
}

impl GeminiAgent {
    pub fn new(api_base: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: trim_base(api_base),
            model: model.to_string(),
            search_grounding: false,
        }
    }

    /// Bind the `google_search` tool so the model can pull live market news.
    pub fn with_search_grounding(mut self, enabled: bool) -> Self {
        self.search_grounding = enabled;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.api_base, self.model)
    }

    fn request_body(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: prompts::system_instruction(chrono::Local::now()),
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            tools: if self.search_grounding {
                vec![Tool {
                    google_search: GoogleSearch {},
                }]
            } else {
                Vec::new()
            },
        }
    }
}

#[async_trait]
impl AnalystAgent for GeminiAgent {
    async fn run(&self, credential: &Credential, prompt: &str) -> Result<String, AgentError> {
        tracing::info!(
            model = %self.model,
            prompt_len = prompt.len(),
            "[FINANCE AGENT] Dispatching to Gemini"
        );

        let res = self
            .client
            .post(self.endpoint())
            .header(API_KEY_HEADER, credential.expose())
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = res.status();
        let text = res.text().await?;

        if !status.is_success() {
            tracing::warn!("[FINANCE AGENT] HTTP {} from Gemini", status);
            return Err(AgentError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&text).map_err(|e| AgentError::Parse(e.to_string()))?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        tracing::debug!(reply_len = content.len(), "[FINANCE AGENT] Gemini reply received");
        Ok(content)
    }
}

/// Live verifier: a key is good if it can list models.
#[derive(Clone)]
pub struct GeminiKeyVerifier {
    client: reqwest::Client,
    api_base: String,
}

impl GeminiKeyVerifier {
    pub fn new(api_base: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: trim_base(api_base),
        }
    }
}

#[async_trait]
impl KeyVerifier for GeminiKeyVerifier {
    async fn verify(&self, credential: &Credential) -> bool {
        let res = self
            .client
            .get(format!("{}/models", self.api_base))
            .query(&[("pageSize", "1")])
            .header(API_KEY_HEADER, credential.expose())
            .send()
            .await;
        match res {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                tracing::warn!("[FINANCE GATE] Gemini key check returned HTTP {}", r.status());
                false
            }
            Err(e) => {
                tracing::warn!("[FINANCE GATE] Gemini key check failed: {}", e);
                false
            }
        }
    }
}
