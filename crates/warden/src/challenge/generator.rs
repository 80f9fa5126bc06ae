//! Challenge issuance.

use std::sync::Arc;

use anyhow::Result;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use warden_common::{Challenge, Difficulty, constants::STORE_TTL_GRACE_SECS};

use super::StoredChallenge;
use crate::clock::Clock;
use crate::store::{Key, Store};

/// Challenge generator service
pub struct ChallengeGenerator {
    /// Challenge TTL in seconds
    pub challenge_ttl: u64,
    clock: Arc<dyn Clock>,
}

impl ChallengeGenerator {
    pub fn new(challenge_ttl: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            challenge_ttl,
            clock,
        }
    }

    /// Issue a new challenge and store it under the challenge namespace
    pub async fn generate(&self, store: &Store, difficulty: Difficulty) -> Result<Challenge> {
        let now = self.clock.timestamp();
        let stored = StoredChallenge {
            id: generate_challenge_id(),
            nonce: generate_nonce(),
            difficulty,
            issued_at: now,
            expires_at: now + self.challenge_ttl as i64,
        };

        let value = serde_json::to_string(&stored)?;
        store
            .set(
                &Key::challenge(&stored.id),
                &value,
                self.challenge_ttl + STORE_TTL_GRACE_SECS,
            )
            .await;

        tracing::debug!(
            challenge_id = %stored.id,
            difficulty = difficulty.value(),
            expires_at = stored.expires_at,
            "Issued challenge"
        );

        Ok(stored.public())
    }
}

/// Generate a cryptographically random challenge ID
fn generate_challenge_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Random nonce as lowercase hex
fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
