//! Proof-of-work challenge issuance and verification.
//!
//! Lifecycle: `Issued -> Verified | Expired | NotFound`. A challenge is
//! consumed on its first successful verification; a wrong solution leaves it
//! in place for another attempt until it expires.

mod generator;
mod verifier;

pub use generator::ChallengeGenerator;
pub use verifier::ChallengeVerifier;

use serde::{Deserialize, Serialize};
use warden_common::{Challenge, Difficulty};

/// Challenge record as stored in either tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChallenge {
    pub id: String,
    pub nonce: String,
    pub difficulty: Difficulty,
    /// Issue timestamp (Unix epoch seconds)
    pub issued_at: i64,
    /// Expiry timestamp (Unix epoch seconds)
    pub expires_at: i64,
}

impl StoredChallenge {
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }

    /// The fields a client needs to compute the proof-of-work
    pub fn public(&self) -> Challenge {
        Challenge {
            id: self.id.clone(),
            nonce: self.nonce.clone(),
            difficulty: self.difficulty,
            issued_at: self.issued_at,
        }
    }
}
