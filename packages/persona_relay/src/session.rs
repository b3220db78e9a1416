//! Per-connection conversation sessions.
//!
//! A session only remembers the upstream continuation token for one logical
//! conversation. Sessions live as long as the connection that owns the store.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Which conversation a request belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SessionKey {
    /// Raw `openai_chat` exchanges
    Direct,
    /// Exchanges with one persona, in `chat` or `multi_chat`
    Persona(String),
}

impl SessionKey {
    pub fn persona(persona_id: impl Into<String>) -> Self {
        Self::Persona(persona_id.into())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Persona(id) => write!(f, "persona:{}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub continuation_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            continuation_token: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<SessionKey, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&mut self, key: &SessionKey) -> &mut Session {
        self.sessions.entry(key.clone()).or_insert_with(|| {
            debug!(session = %key, "Session created");
            Session::new()
        })
    }

    /// Replace the stored token wholesale
    pub fn update_token(&mut self, key: &SessionKey, token: impl Into<String>) {
        let session = self.get_or_create(key);
        session.continuation_token = Some(token.into());
        session.updated_at = Utc::now();
    }

    pub fn continuation(&self, key: &SessionKey) -> Option<&str> {
        self.sessions
            .get(key)
            .and_then(|s| s.continuation_token.as_deref())
    }

    /// Token to send upstream: an explicit one from the request wins over the stored one.
    pub fn resolve(&self, key: &SessionKey, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.continuation(key).map(str::to_string))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
