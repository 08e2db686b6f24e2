//! Credential Gate: format check, verification, and session hand-off for the Gemini API key.
//!
//! The accepted [`Credential`] is stored in the caller's [`Session`] and passed explicitly to the
//! agent on every call. Nothing here touches process environment variables.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::GateRejection;
use crate::session::Session;

/// ASCII letters, digits, underscore, hyphen; at least 25 characters.
/// Heuristic for Gemini keys, not the vendor's published format.
static KEY_FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{25,}$").expect("key format regex")
});

/// Result of [`CredentialGate::accept`]: `Ok` is Accepted, `Err` is Rejected.
pub type GateResult = Result<Credential, GateRejection>;

/// Returns true if `raw` looks like a Gemini API key.
pub fn is_valid_key_format(raw: &str) -> bool {
    KEY_FORMAT.is_match(raw)
}

/// A bearer secret that passed the format rule. Only obtainable through [`Credential::parse`].
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Format check only; empty input fails with `InvalidFormat`.
    pub fn parse(raw: &str) -> Result<Self, GateRejection> {
        if raw.is_empty() || !is_valid_key_format(raw) {
            return Err(GateRejection::InvalidFormat);
        }
        Ok(Self(raw.to_string()))
    }

    /// The raw secret, for outbound request headers only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(****)")
    }
}

/// External verification collaborator.
#[async_trait]
pub trait KeyVerifier: Send + Sync {
    /// True if the credential is usable against the model service.
    async fn verify(&self, credential: &Credential) -> bool;
}

/// Accepts every well-formed credential without a network round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalVerifier;

#[async_trait]
impl KeyVerifier for LocalVerifier {
    async fn verify(&self, _credential: &Credential) -> bool {
        true
    }
}

/// Gates the UI behind a validated credential.
#[derive(Clone)]
pub struct CredentialGate {
    verifier: Arc<dyn KeyVerifier>,
}

impl CredentialGate {
    pub fn new(verifier: Arc<dyn KeyVerifier>) -> Self {
        Self { verifier }
    }

    /// Unauthenticated -> PendingValidation -> {Authenticated | Unauthenticated(error)}.
    pub async fn accept(&self, session: &mut Session, raw: &str) -> GateResult {
        session.begin_validation();

        let credential = match Credential::parse(raw) {
            Ok(c) => c,
            Err(reason) => {
                tracing::info!("[FINANCE GATE] Rejected credential: {}", reason);
                session.reject(reason);
                return Err(reason);
            }
        };

        if !self.verifier.verify(&credential).await {
            tracing::warn!("[FINANCE GATE] Credential failed verification");
            session.reject(GateRejection::VerificationFailed);
            return Err(GateRejection::VerificationFailed);
        }

        tracing::info!("[FINANCE GATE] Credential accepted");
        session.authenticate(credential.clone());
        Ok(credential)
    }

    /// Authenticated -> Unauthenticated. Idempotent.
    pub fn reset(&self, session: &mut Session) {
        session.reset();
        tracing::info!("[FINANCE GATE] Session credential cleared");
    }
}
