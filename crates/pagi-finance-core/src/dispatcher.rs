//! Query Dispatcher: ticker in, analyst report (or a classified failure) out.

use std::sync::Arc;

use crate::agent::AnalystAgent;
use crate::credential_gate::Credential;
use crate::error::AnalysisError;
use crate::prompts;

/// Substrings (lowercase) that mark an agent failure as a likely credential problem.
const CREDENTIAL_SUSPECT_PHRASES: &[&str] = &["authentication", "api key", "unauthorized"];

/// Outcome of one Analyze press.
pub type AnalysisResult = Result<AnalysisReport, AnalysisError>;

/// Detects if an agent error message points at the credential.
pub fn is_credential_suspect(message: &str) -> bool {
    let lower = message.to_lowercase();
    CREDENTIAL_SUSPECT_PHRASES.iter().any(|p| lower.contains(p))
}

/// One ticker to analyze. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    ticker: String,
}

impl AnalysisRequest {
    pub fn new(ticker: &str) -> Result<Self, AnalysisError> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(AnalysisError::EmptyTicker);
        }
        Ok(Self {
            ticker: ticker.to_string(),
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn prompt(&self) -> String {
        prompts::analysis_query(&self.ticker)
    }
}

/// Report text returned by the agent for a ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub ticker: String,
    pub text: String,
}

/// Sends analysis prompts to the agent collaborator.
#[derive(Clone)]
pub struct QueryDispatcher {
    agent: Arc<dyn AnalystAgent>,
}

impl QueryDispatcher {
    pub fn new(agent: Arc<dyn AnalystAgent>) -> Self {
        Self { agent }
    }

    /// Single awaited call, no retries. Requires an accepted credential.
    pub async fn analyze(&self, credential: &Credential, ticker: &str) -> AnalysisResult {
        let request = AnalysisRequest::new(ticker)?;

        tracing::info!(ticker = %request.ticker(), "[FINANCE DISPATCH] Analysis requested");

        match self.agent.run(credential, &request.prompt()).await {
            Ok(text) if text.trim().is_empty() => {
                tracing::warn!(ticker = %request.ticker(), "[FINANCE DISPATCH] Empty agent reply");
                Err(AnalysisError::EmptyResponse)
            }
            Ok(text) => Ok(AnalysisReport {
                ticker: request.ticker,
                text,
            }),
            Err(e) => {
                let message = e.to_string();
                let credential_suspect = is_credential_suspect(&message);
                tracing::error!(
                    ticker = %request.ticker(),
                    credential_suspect,
                    "[FINANCE DISPATCH] Agent failure: {}",
                    message
                );
                Err(AnalysisError::AgentFailure {
                    message,
                    credential_suspect,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    enum Reply {
        Text(&'static str),
        Fail(u16, &'static str),
    }

    struct StubAgent {
        reply: Reply,
        prompts: Mutex<Vec<String>>,
    }

    impl StubAgent {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl AnalystAgent for StubAgent {
        async fn run(&self, _credential: &Credential, prompt: &str) -> Result<String, AgentError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.reply {
                Reply::Text(t) => Ok(t.to_string()),
                Reply::Fail(status, body) => Err(AgentError::Api {
                    status,
                    body: body.to_string(),
                }),
            }
        }
    }

    fn key() -> Credential {
        Credential::parse("abcdefghijklmnopqrstuvwxyz012").unwrap()
    }

    #[tokio::test]
    async fn empty_ticker_never_calls_agent() {
        let agent = StubAgent::new(Reply::Text("report text"));
        let dispatcher = QueryDispatcher::new(agent.clone());
        for _ in 0..2 {
            assert_eq!(
                dispatcher.analyze(&key(), "").await,
                Err(AnalysisError::EmptyTicker)
            );
        }
        assert_eq!(
            dispatcher.analyze(&key(), "   ").await,
            Err(AnalysisError::EmptyTicker)
        );
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn returns_agent_text() {
        let agent = StubAgent::new(Reply::Text("report text"));
        let dispatcher = QueryDispatcher::new(agent.clone());
        let report = dispatcher.analyze(&key(), "AAPL").await.unwrap();
        assert_eq!(report.text, "report text");
        assert_eq!(report.ticker, "AAPL");
        assert_eq!(
            agent.calls(),
            vec!["What's the latest news and financial performance of AAPL?".to_string()]
        );
    }

    #[tokio::test]
    async fn blank_reply_is_empty_response() {
        let dispatcher = QueryDispatcher::new(StubAgent::new(Reply::Text("  \n")));
        assert_eq!(
            dispatcher.analyze(&key(), "GOOGL").await,
            Err(AnalysisError::EmptyResponse)
        );
    }

    #[tokio::test]
    async fn unauthorized_failure_is_credential_suspect() {
        let dispatcher = QueryDispatcher::new(StubAgent::new(Reply::Fail(401, "Unauthorized")));
        let err = dispatcher.analyze(&key(), "AAPL").await.unwrap_err();
        match &err {
            AnalysisError::AgentFailure {
                message,
                credential_suspect,
            } => {
                assert!(message.contains("Unauthorized"));
                assert!(*credential_suspect);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_failures_are_not_suspect() {
        let dispatcher =
            QueryDispatcher::new(StubAgent::new(Reply::Fail(503, "model overloaded")));
        let err = dispatcher.analyze(&key(), "TSLA").await.unwrap_err();
        assert!(matches!(err, AnalysisError::AgentFailure { .. }));
        assert!(!err.credential_suspect());
    }

    proptest! {
        #[test]
        fn prop_blank_ticker_is_rejected(ws in "[ \t\r\n]{0,12}") {
            prop_assert_eq!(AnalysisRequest::new(&ws), Err(AnalysisError::EmptyTicker));
        }

        #[test]
        fn prop_prompt_carries_trimmed_ticker(ticker in "[A-Z.]{1,8}", pad in "[ \t]{0,4}") {
            let req = AnalysisRequest::new(&format!("{pad}{ticker}{pad}")).unwrap();
            prop_assert_eq!(req.ticker(), ticker.as_str());
            prop_assert_eq!(
                req.prompt(),
                format!("What's the latest news and financial performance of {ticker}?")
            );
        }

        #[test]
        fn prop_suspect_phrase_anywhere_any_case(
            before in "[a-z0-9 ]{0,20}",
            after in "[a-z0-9 ]{0,20}",
            phrase in prop::sample::select(vec!["authentication", "api key", "unauthorized"]),
            upper in any::<bool>(),
        ) {
            let phrase = if upper { phrase.to_uppercase() } else { phrase.to_string() };
            let message = format!("{before}{phrase}{after}");
            prop_assert!(is_credential_suspect(&message));
        }
    }

    #[test]
    fn suspect_phrases_are_case_insensitive() {
        assert!(is_credential_suspect("API key not valid. Please pass a valid API key."));
        assert!(is_credential_suspect("Request had invalid AUTHENTICATION credentials"));
        assert!(is_credential_suspect("401 unauthorized"));
        assert!(!is_credential_suspect("quota exceeded for project"));
    }
}
