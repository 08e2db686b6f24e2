//! Per-session credential record. Mutated only by the Credential Gate.

use crate::credential_gate::Credential;
use crate::error::GateRejection;

/// Credential lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialState {
    Unauthenticated,
    PendingValidation,
    Authenticated,
}

/// Session state. `credential_accepted` implies a format-checked credential is present.
#[derive(Debug, Clone, Default)]
pub struct Session {
    credential: Option<Credential>,
    credential_accepted: bool,
    pending: bool,
    last_rejection: Option<GateRejection>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session that starts authenticated, e.g. from a startup credential.
    pub fn with_credential(credential: Credential) -> Self {
        let mut session = Self::new();
        session.authenticate(credential);
        session
    }

    pub fn state(&self) -> CredentialState {
        if self.pending {
            CredentialState::PendingValidation
        } else if self.credential_accepted {
            CredentialState::Authenticated
        } else {
            CredentialState::Unauthenticated
        }
    }

    /// The accepted credential, if any.
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref().filter(|_| self.credential_accepted)
    }

    pub fn credential_accepted(&self) -> bool {
        self.credential_accepted
    }

    /// Reason the most recent validation failed; cleared on acceptance and reset.
    pub fn last_rejection(&self) -> Option<GateRejection> {
        self.last_rejection
    }

    pub(crate) fn begin_validation(&mut self) {
        self.credential = None;
        self.credential_accepted = false;
        self.last_rejection = None;
        self.pending = true;
    }

    pub(crate) fn authenticate(&mut self, credential: Credential) {
        self.credential = Some(credential);
        self.credential_accepted = true;
        self.last_rejection = None;
        self.pending = false;
    }

    pub(crate) fn reject(&mut self, reason: GateRejection) {
        self.credential = None;
        self.credential_accepted = false;
        self.last_rejection = Some(reason);
        self.pending = false;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
