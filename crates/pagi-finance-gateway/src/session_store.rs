//! Cookie-keyed session store. The gateway owns session lifecycle; handlers get one session each.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, HeaderValue};
use dashmap::DashMap;
use pagi_finance_core::{Session, StartupCredential};
use tokio::sync::Mutex;

pub const SESSION_COOKIE: &str = "pagi_finance_session";

/// Held for the whole handler, so interactions on one session run one at a time.
pub type SessionHandle = Arc<Mutex<Session>>;

/// A resolved session for the current request.
pub struct SessionSlot {
    pub id: String,
    pub handle: SessionHandle,
    /// True when the id must be sent back in a Set-Cookie header.
    pub created: bool,
}

struct Entry {
    handle: SessionHandle,
    last_seen: Instant,
}

/// How long an idle session survives and how many may be live at once.
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    pub idle: Duration,
    pub max_sessions: usize,
}

pub struct SessionStore {
    sessions: DashMap<String, Entry>,
    startup: StartupCredential,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new(startup: StartupCredential, limits: SessionLimits) -> Self {
        Self {
            sessions: DashMap::new(),
            startup,
            limits,
        }
    }

    pub fn startup(&self) -> &StartupCredential {
        &self.startup
    }

    /// Known, non-expired session for the request cookie. Never creates one.
    pub fn lookup(&self, headers: &HeaderMap) -> Option<(String, SessionHandle)> {
        let id = session_id(headers)?;
        let handle = self.touch(&id)?;
        Some((id, handle))
    }

    /// Existing session for the request cookie, or a fresh one seeded from the startup credential.
    pub fn resolve(&self, headers: &HeaderMap) -> SessionSlot {
        if let Some((id, handle)) = self.lookup(headers) {
            return SessionSlot {
                id,
                handle,
                created: false,
            };
        }

        self.evict();

        let id = uuid::Uuid::new_v4().to_string();
        let session = match self.startup.credential() {
            Some(c) => Session::with_credential(c.clone()),
            None => Session::new(),
        };
        let handle = Arc::new(Mutex::new(session));
        self.sessions.insert(
            id.clone(),
            Entry {
                handle: Arc::clone(&handle),
                last_seen: Instant::now(),
            },
        );
        tracing::debug!(
            "[FINANCE SESSION] New session {} ({} active)",
            id,
            self.sessions.len()
        );
        SessionSlot {
            id,
            handle,
            created: true,
        }
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Refresh `last_seen`; an expired entry is dropped instead.
    fn touch(&self, id: &str) -> Option<SessionHandle> {
        let idle = self.limits.idle;
        {
            let mut entry = self.sessions.get_mut(id)?;
            if entry.last_seen.elapsed() < idle {
                entry.last_seen = Instant::now();
                return Some(Arc::clone(&entry.handle));
            }
        }
        self.sessions
            .remove_if(id, |_, e| e.last_seen.elapsed() >= idle);
        None
    }

    /// Drop idle sessions, then the least recently seen until there is room for one more.
    fn evict(&self) {
        let idle = self.limits.idle;
        self.sessions.retain(|_, e| e.last_seen.elapsed() < idle);

        while self.sessions.len() >= self.limits.max_sessions.max(1) {
            let oldest = self
                .sessions
                .iter()
                .min_by_key(|e| e.value().last_seen)
                .map(|e| e.key().clone());
            match oldest {
                Some(id) => {
                    self.sessions.remove(&id);
                    tracing::debug!("[FINANCE SESSION] Evicted session {}", id);
                }
                None => break,
            }
        }
    }
}

/// Reads our session id from the `Cookie` header.
pub fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(id: &str) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict",
        SESSION_COOKIE, id
    ))
    .ok()
}
