//! Session lifecycle backed by the dual-tier store.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use warden_common::{Session, constants::STORE_TTL_GRACE_SECS};

use crate::clock::Clock;
use crate::store::{Key, Store};

/// Session management service
pub struct SessionManager {
    /// Session TTL in seconds
    pub session_ttl: u64,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(session_ttl: u64, clock: Arc<dyn Clock>) -> Self {
        Self { session_ttl, clock }
    }

    /// Create and store a fresh session
    pub async fn create(&self, store: &Store) -> Result<Session> {
        let now = self.clock.timestamp();
        let session = Session {
            token: generate_session_token(),
            created_at: now,
            expires_at: now + self.session_ttl as i64,
        };

        let value = serde_json::to_string(&session)?;
        store
            .set(
                &Key::session(&session.token),
                &value,
                self.session_ttl + STORE_TTL_GRACE_SECS,
            )
            .await;

        tracing::debug!(expires_at = session.expires_at, "Session created");

        Ok(session)
    }

    /// Check a bearer token. Never extends the session.
    pub async fn validate(&self, store: &Store, token: Option<&str>) -> bool {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return false;
        };

        let key = Key::session(token);
        let Some(raw) = store.get(&key).await else {
            return false;
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding unreadable session");
                store.delete(&key).await;
                return false;
            }
        };

        if session.is_expired_at(self.clock.timestamp()) {
            store.delete(&key).await;
            tracing::debug!("Session expired");
            return false;
        }

        true
    }

    /// Explicitly revoke a session
    pub async fn revoke(&self, store: &Store, token: &str) {
        if token.is_empty() {
            return;
        }
        let key = Key::session(token);
        if !store.delete(&key).await {
            tracing::warn!("Remote delete unconfirmed, tombstoning revoked session");
            store
                .bury(&key, Duration::from_secs(self.session_ttl + STORE_TTL_GRACE_SECS))
                .await;
        }
        tracing::debug!("Session revoked");
    }
}

/// Generate a cryptographically secure session token
fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
