//! Short-lived guest sessions issued after phone verification.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A verified guest identity, valid until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestSession {
    pub token: String,
    pub phone: String,
    pub expires_at: DateTime<Utc>,
}

impl GuestSession {
    /// Returns true once the session has expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Registry of guest sessions.
#[derive(Debug, Clone)]
pub struct GuestSessions {
    ttl: Duration,
    sessions: Arc<RwLock<HashMap<String, GuestSession>>>,
}

impl GuestSessions {
    /// Creates a registry whose sessions last `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Issues a session for a verified phone number.
    pub async fn issue(&self, phone: impl Into<String>) -> GuestSession {
        let session = GuestSession {
            token: Uuid::new_v4().simple().to_string(),
            phone: phone.into(),
            expires_at: Utc::now() + self.ttl,
        };
        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        session
    }

    /// Looks up a live session. Expired sessions are evicted.
    pub async fn resolve(&self, token: &str) -> Option<GuestSession> {
        let now = Utc::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return None,
                Some(session) if !session.is_expired_at(now) => return Some(session.clone()),
                Some(_) => {}
            }
        }

        self.sessions.write().await.remove(token);
        tracing::debug!("expired guest session evicted");
        None
    }

    /// Drops every expired session. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired_at(now));
        before - sessions.len()
    }

    /// Number of sessions held, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
