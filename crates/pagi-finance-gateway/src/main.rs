//! PAGI Finance Gateway: Financial Analysis Assistant at 127.0.0.1:8000 by default.
//! Credential Gate in front, Query Dispatcher behind it, one session per browser cookie.

mod pages;
mod session_store;

use axum::{
    body::Body,
    extract::{ConnectInfo, Form, State},
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use pagi_finance_core::{
    CredentialGate, CredentialState, FinanceConfig, QueryDispatcher, StartupCredential,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pages::{AnalysisPage, GatePage, Notice};
use session_store::{session_cookie, SessionLimits, SessionSlot, SessionStore};

#[derive(Clone)]
struct AppState {
    app_name: Arc<str>,
    sessions: Arc<SessionStore>,
    gate: CredentialGate,
    dispatcher: QueryDispatcher,
}

#[derive(Deserialize)]
struct CredentialForm {
    #[serde(default)]
    api_key: String,
}

#[derive(Deserialize)]
struct AnalyzeForm {
    #[serde(default)]
    ticker: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match FinanceConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("[FINANCE SYSTEM] {}", e);
            std::process::exit(1);
        }
    };
    let (addr, agent) = match (config.bind_addr(), config.build_agent()) {
        (Ok(addr), Ok(agent)) => (addr, agent),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("[FINANCE SYSTEM] {}", e);
            std::process::exit(1);
        }
    };

    let startup = config.startup_credential();
    match &startup {
        StartupCredential::Valid(_) => tracing::info!(
            "[FINANCE SYSTEM] Startup credential from {} accepted",
            config.credential_env
        ),
        StartupCredential::Invalid => tracing::warn!(
            "[FINANCE SYSTEM] Startup credential from {} is malformed; ignoring it",
            config.credential_env
        ),
        StartupCredential::Absent => {}
    }

    let state = AppState {
        app_name: Arc::from(config.app_name.as_str()),
        sessions: Arc::new(SessionStore::new(
            startup,
            SessionLimits {
                idle: config.session_idle(),
                max_sessions: config.max_sessions,
            },
        )),
        gate: CredentialGate::new(config.build_verifier()),
        dispatcher: QueryDispatcher::new(agent),
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("[FINANCE SYSTEM] Bind {} failed: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "[FINANCE SYSTEM] {} v{} listening on http://{} (llm_mode={}, model={})",
        config.app_name,
        pagi_finance_core::version(),
        addr,
        config.llm_mode,
        config.model
    );

    if let Err(e) = axum::serve(
        listener,
        app(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("[FINANCE SYSTEM] Server error: {}", e);
        std::process::exit(1);
    }
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(index))
        .route("/credential", post(submit_credential))
        .route("/credential/reset", post(reset_credential))
        .route("/analyze", post(analyze))
        .with_state(state)
        .layer(axum::middleware::from_fn(log_traffic))
}

async fn log_traffic(
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer = connect_info
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    tracing::info!(
        "[FINANCE SYSTEM] {} {} from {}",
        request.method(),
        request.uri().path(),
        peer
    );
    next.run(request).await
}

async fn health() -> &'static str {
    "OK"
}

/// Attach the session cookie when the session was created by this request.
fn with_session(slot: &SessionSlot, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    if slot.created {
        if let Some(cookie) = session_cookie(&slot.id) {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
        }
    }
    response
}

fn gate_page(state: &AppState, notice: Option<Notice>) -> Html<String> {
    Html(pages::render_gate(&GatePage {
        app_name: &state.app_name,
        startup_invalid: matches!(state.sessions.startup(), StartupCredential::Invalid),
        notice,
    }))
}

/// GET /: credential form until the session is authenticated, then the ticker form.
async fn index(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let slot = state.sessions.resolve(&headers);
    let session = slot.handle.lock().await;

    let page = if session.state() == CredentialState::Authenticated {
        Html(pages::render_analysis(&AnalysisPage {
            app_name: &state.app_name,
            ticker: "",
            report: None,
            notice: None,
            offer_reset: false,
        }))
    } else {
        gate_page(&state, None)
    };
    drop(session);
    with_session(&slot, page)
}

/// POST /credential: run the Credential Gate; accepted -> back to `/`, rejected -> form with banner.
async fn submit_credential(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<CredentialForm>,
) -> Response {
    let slot = state.sessions.resolve(&headers);
    let mut session = slot.handle.lock().await;

    if session.state() == CredentialState::Authenticated {
        drop(session);
        return with_session(&slot, Redirect::to("/"));
    }

    let result = state.gate.accept(&mut session, &form.api_key).await;
    drop(session);

    match result {
        Ok(_) => with_session(&slot, Redirect::to("/")),
        Err(reason) => {
            let msg = if form.api_key.is_empty() {
                "Please enter an API key.".to_string()
            } else {
                reason.to_string()
            };
            with_session(&slot, gate_page(&state, Some(Notice::Error(msg))))
        }
    }
}

/// POST /credential/reset: explicit user reset; startup credential is not re-applied.
async fn reset_credential(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some((_, handle)) = state.sessions.lookup(&headers) {
        let mut session = handle.lock().await;
        state.gate.reset(&mut session);
    }
    Redirect::to("/").into_response()
}

/// POST /analyze: one agent call per press; the session stays locked until the reply is rendered.
async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Form(form): Form<AnalyzeForm>,
) -> Response {
    let Some((_, handle)) = state.sessions.lookup(&headers) else {
        return Redirect::to("/").into_response();
    };
    let session = handle.lock().await;

    let Some(credential) = session.credential().cloned() else {
        return Redirect::to("/").into_response();
    };

    let result = state.dispatcher.analyze(&credential, &form.ticker).await;
    drop(session);

    let (report, notice, offer_reset) = match &result {
        Ok(report) => (Some(report), None, false),
        Err(e) => (None, Some(Notice::Error(e.to_string())), e.credential_suspect()),
    };

    let page = Html(pages::render_analysis(&AnalysisPage {
        app_name: &state.app_name,
        ticker: form.ticker.trim(),
        report,
        notice,
        offer_reset,
    }))
    .into_response();
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use pagi_finance_core::{AgentError, AnalystAgent, Credential, KeyVerifier, LocalVerifier};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    const GOOD_KEY: &str = "AIzaSyA1b2C3d4E5f6G7h8I9j0K_lM-nOpQ";

    struct StubAgent {
        reply: Result<&'static str, &'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AnalystAgent for StubAgent {
        async fn run(&self, credential: &Credential, _prompt: &str) -> Result<String, AgentError> {
            assert_eq!(credential.expose(), GOOD_KEY);
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(body) => Err(AgentError::Api {
                    status: 401,
                    body: body.to_string(),
                }),
            }
        }
    }

    struct RejectAll;

    #[async_trait]
    impl KeyVerifier for RejectAll {
        async fn verify(&self, _credential: &Credential) -> bool {
            false
        }
    }

    fn test_state(
        reply: Result<&'static str, &'static str>,
        verifier: Arc<dyn KeyVerifier>,
        startup: StartupCredential,
    ) -> (AppState, Arc<StubAgent>) {
        let agent = Arc::new(StubAgent {
            reply,
            calls: AtomicUsize::new(0),
        });
        let state = AppState {
            app_name: Arc::from("Financial Analysis Assistant"),
            sessions: Arc::new(SessionStore::new(
                startup,
                SessionLimits {
                    idle: Duration::from_secs(3600),
                    max_sessions: 100,
                },
            )),
            gate: CredentialGate::new(verifier),
            dispatcher: QueryDispatcher::new(agent.clone()),
        };
        (state, agent)
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut b = Request::builder().method("GET").uri(uri);
        if let Some(c) = cookie {
            b = b.header(header::COOKIE, c);
        }
        b.body(Body::empty()).unwrap()
    }

    fn post_form(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut b = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(c) = cookie {
            b = b.header(header::COOKIE, c);
        }
        b.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_text(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// `name=value` part of the Set-Cookie header.
    fn cookie_of(res: &Response) -> String {
        res.headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
            .expect("session cookie")
    }

    async fn signed_in(app: &Router) -> String {
        let res = app
            .clone()
            .oneshot(post_form("/credential", None, &format!("api_key={}", GOOD_KEY)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        cookie_of(&res)
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let res = app(state).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "OK");
    }

    #[tokio::test]
    async fn test_index_shows_key_form_and_sets_cookie() {
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let res = app(state).oneshot(get("/", None)).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(cookie_of(&res).starts_with("pagi_finance_session="));
        let html = body_text(res).await;
        assert!(html.contains("Valid Google Gemini API Key required"));
        assert!(html.contains(r#"action="/credential""#));
        assert!(!html.contains(r#"action="/analyze""#));
    }

    #[tokio::test]
    async fn test_bad_format_and_empty_key_banners() {
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let app = app(state);

        let res = app
            .clone()
            .oneshot(post_form("/credential", None, "api_key=short"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(body_text(res).await.contains("Invalid API key format"));

        let res = app
            .oneshot(post_form("/credential", None, "api_key="))
            .await
            .unwrap();
        assert!(body_text(res).await.contains("Please enter an API key."));
    }

    #[tokio::test]
    async fn test_verification_failure_banner() {
        let (state, _) = test_state(Ok("x"), Arc::new(RejectAll), StartupCredential::Absent);
        let res = app(state)
            .oneshot(post_form("/credential", None, &format!("api_key={}", GOOD_KEY)))
            .await
            .unwrap();
        assert!(body_text(res).await.contains("API key validation failed"));
    }

    #[tokio::test]
    async fn test_accepted_key_unlocks_analysis_form() {
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let app = app(state);
        let cookie = signed_in(&app).await;

        let res = app.oneshot(get("/", Some(&cookie))).await.unwrap();
        let html = body_text(res).await;
        assert!(html.contains(r#"action="/analyze""#));
        assert!(html.contains("How to Use"));
    }

    #[tokio::test]
    async fn test_analyze_renders_report() {
        let (state, agent) = test_state(
            Ok("## Summary\n\nreport text"),
            Arc::new(LocalVerifier),
            StartupCredential::Absent,
        );
        let app = app(state);
        let cookie = signed_in(&app).await;

        let res = app
            .oneshot(post_form("/analyze", Some(&cookie), "ticker=AAPL"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("Analysis Report:"));
        assert!(html.contains(r#"<div class="scrollable"><h2>Summary</h2>"#));
        assert!(html.contains("<p>report text</p>"));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_ticker_skips_agent() {
        let (state, agent) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let app = app(state);
        let cookie = signed_in(&app).await;

        let res = app
            .oneshot(post_form("/analyze", Some(&cookie), "ticker="))
            .await
            .unwrap();
        assert!(body_text(res).await.contains("Please enter a stock ticker symbol."));
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unauthorized_failure_offers_reset() {
        let (state, _) = test_state(
            Err("Unauthorized"),
            Arc::new(LocalVerifier),
            StartupCredential::Absent,
        );
        let app = app(state);
        let cookie = signed_in(&app).await;

        let res = app
            .clone()
            .oneshot(post_form("/analyze", Some(&cookie), "ticker=AAPL"))
            .await
            .unwrap();
        let html = body_text(res).await;
        assert!(html.contains("An error occurred during analysis"));
        assert!(html.contains("Reset API Key"));

        // Offer only; the session is still authenticated until the user confirms.
        let res = app.clone().oneshot(get("/", Some(&cookie))).await.unwrap();
        assert!(body_text(res).await.contains(r#"action="/analyze""#));

        let res = app
            .clone()
            .oneshot(post_form("/credential/reset", Some(&cookie), ""))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        let res = app.oneshot(get("/", Some(&cookie))).await.unwrap();
        assert!(body_text(res).await.contains(r#"action="/credential""#));
    }

    #[tokio::test]
    async fn test_cookieless_reset_and_analyze_create_no_session() {
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let sessions = Arc::clone(&state.sessions);
        let app = app(state);

        for req in [
            post_form("/credential/reset", None, ""),
            post_form("/credential/reset", Some("pagi_finance_session=forged"), ""),
            post_form("/analyze", None, "ticker=AAPL"),
            post_form("/analyze", Some("pagi_finance_session=forged"), "ticker=AAPL"),
        ] {
            let res = app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
            assert!(res.headers().get(header::SET_COOKIE).is_none());
        }
        assert_eq!(sessions.active(), 0);
    }

    #[tokio::test]
    async fn test_analyze_requires_credential() {
        let (state, agent) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Absent);
        let res = app(state)
            .oneshot(post_form("/analyze", None, "ticker=AAPL"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SEE_OTHER);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_startup_credential_is_not_reapplied_after_reset() {
        let key = Credential::parse(GOOD_KEY).unwrap();
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Valid(key));
        let app = app(state);

        let res = app.clone().oneshot(get("/", None)).await.unwrap();
        let cookie = cookie_of(&res);
        assert!(body_text(res).await.contains(r#"action="/analyze""#));

        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(post_form("/credential/reset", Some(&cookie), ""))
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::SEE_OTHER);
        }
        let res = app.oneshot(get("/", Some(&cookie))).await.unwrap();
        assert!(body_text(res).await.contains(r#"action="/credential""#));
    }

    #[tokio::test]
    async fn test_invalid_startup_credential_banner() {
        let (state, _) = test_state(Ok("x"), Arc::new(LocalVerifier), StartupCredential::Invalid);
        let res = app(state).oneshot(get("/", None)).await.unwrap();
        assert!(body_text(res)
            .await
            .contains("API key found in environment variables is invalid."));
    }
}
