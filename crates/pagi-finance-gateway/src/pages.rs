//! HTML rendering for the single-page assistant.

use pagi_finance_core::AnalysisReport;
use pulldown_cmark::{html, Event, Options, Parser};

const STYLE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/static/finance.css"));

/// Inline banner shown above the forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Warning(String),
}

/// Credential form page (Unauthenticated).
pub struct GatePage<'a> {
    pub app_name: &'a str,
    pub startup_invalid: bool,
    pub notice: Option<Notice>,
}

/// Ticker form page (Authenticated), optionally with a report or an error.
pub struct AnalysisPage<'a> {
    pub app_name: &'a str,
    pub ticker: &'a str,
    pub report: Option<&'a AnalysisReport>,
    pub notice: Option<Notice>,
    /// Offer an explicit "Reset API Key" after a credential-suspect failure.
    pub offer_reset: bool,
}

pub fn render_gate(page: &GatePage<'_>) -> String {
    let mut body = String::new();
    if page.startup_invalid {
        body.push_str(&banner(&Notice::Error(
            "API key found in environment variables is invalid.".into(),
        )));
    }
    body.push_str(&banner(&Notice::Warning(
        "Valid Google Gemini API Key required to use this application.".into(),
    )));
    if let Some(n) = &page.notice {
        body.push_str(&banner(n));
    }
    body.push_str(
        r#"<form method="post" action="/credential">
  <label for="api_key">Enter your Google Gemini API Key:</label>
  <input id="api_key" name="api_key" type="password" autocomplete="off">
  <div class="help">Your API key should be at least 25 characters long.</div>
  <button type="submit">Validate &amp; Set API Key</button>
</form>"#,
    );
    layout(page.app_name, None, &body)
}

pub fn render_analysis(page: &AnalysisPage<'_>) -> String {
    let mut body = format!(
        r#"<form method="post" action="/analyze">
  <label for="ticker">Enter the stock ticker symbol (e.g., AAPL):</label>
  <input id="ticker" name="ticker" type="text" value="{}">
  <button type="submit">Analyze</button>
</form>"#,
        html_escape(page.ticker)
    );

    if let Some(n) = &page.notice {
        body.push_str(&banner(n));
    }
    if page.offer_reset {
        body.push_str(&banner(&Notice::Error(
            "This may be an API key issue. Please try resetting your API key.".into(),
        )));
        body.push_str(
            r#"<form method="post" action="/credential/reset"><button type="submit">Reset API Key</button></form>"#,
        );
    }
    if let Some(report) = page.report {
        body.push_str(&format!(
            r#"<h3>Analysis Report:</h3><div class="scrollable">{}</div>"#,
            render_markdown(&report.text)
        ));
    }

    layout(page.app_name, Some(SIDEBAR), &body)
}

const SIDEBAR: &str = r#"<h2>📘 How to Use</h2>
<p>This AI-powered <strong>Financial Analysis Assistant</strong> helps you analyze stocks using live market data.<br>Simply:</p>
<ol>
  <li>Enter a <strong>stock ticker symbol</strong> (e.g., <code>AAPL</code>, <code>GOOGL</code>, <code>TSLA</code>)</li>
  <li>Click <strong>"Analyze"</strong></li>
  <li>Get a detailed report with 📈 trends, 🧾 financials, and 🔍 analyst insights.</li>
</ol>
<hr>
<h3>💡 Examples</h3>
<ul>
  <li><code>AAPL</code> – Apple Inc.</li>
  <li><code>MSFT</code> – Microsoft Corp</li>
  <li><code>GOOGL</code> – Alphabet Inc</li>
  <li><code>TSLA</code> – Tesla Inc</li>
  <li><code>NFLX</code> – Netflix Inc</li>
</ul>
<h3>🔐 Notes</h3>
<ul>
  <li>Powered by <strong>Gemini</strong> via the PAGI Finance gateway.</li>
  <li>Analysis may take a moment to complete.</li>
</ul>
<form method="post" action="/credential/reset"><button type="submit">Change API Key</button></form>
<hr>"#;

fn layout(app_name: &str, sidebar: Option<&str>, body: &str) -> String {
    let title = html_escape(app_name);
    let aside = sidebar
        .map(|s| format!("<aside>{}</aside>", s))
        .unwrap_or_default();
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>{STYLE}</style>
</head>
<body>
{aside}
<main>
<h1>{title}</h1>
{body}
</main>
</body>
</html>"#
    )
}

fn banner(notice: &Notice) -> String {
    let (class, msg) = match notice {
        Notice::Error(m) => ("banner banner-error", m),
        Notice::Warning(m) => ("banner banner-warning", m),
    };
    format!(r#"<div class="{}">{}</div>"#, class, html_escape(msg))
}

/// Markdown to HTML. Raw HTML in the model output is shown as text, never injected.
pub fn render_markdown(md: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let events = Parser::new_ext(md, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
