//! Core types shared across Warden components.

use serde::{Deserialize, Serialize};

/// Proof-of-work difficulty: the number of leading `'0'` hex characters a
/// solution hash must carry.
///
/// - 1-2: trivial (development)
/// - 3-4: standard protection
/// - 5-6: under attack
/// - 7+: emergency, expect multi-second solves on mobile clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: Difficulty = Difficulty(1);
    pub const MAX: Difficulty = Difficulty(10);
    pub const DEFAULT: Difficulty = Difficulty(crate::constants::DEFAULT_DIFFICULTY);

    /// Create a new Difficulty, clamping to valid range [1, 10]
    pub fn new(level: u8) -> Self {
        Self(level.clamp(Self::MIN.0, Self::MAX.0))
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// Returns true if `hex_digest` starts with the required run of zeros
    pub fn is_met_by(&self, hex_digest: &str) -> bool {
        let required = self.0 as usize;
        hex_digest.len() >= required && hex_digest.bytes().take(required).all(|b| b == b'0')
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<u8> for Difficulty {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

/// Proof-of-work challenge as sent to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Unique challenge ID
    pub id: String,

    /// Random nonce mixed into the hash input
    pub nonce: String,

    /// Required leading zeros
    pub difficulty: Difficulty,

    /// Issue timestamp (Unix epoch seconds)
    #[serde(rename = "timestamp")]
    pub issued_at: i64,
}

/// Bearer session granted after a successful verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque bearer token (cookie value)
    pub token: String,

    /// Creation timestamp (Unix epoch seconds)
    pub created_at: i64,

    /// Expiry timestamp (Unix epoch seconds)
    pub expires_at: i64,
}

impl Session {
    /// Check if the session is past its expiry at `now`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.expires_at
    }
}

/// Role a remote store node reported during discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts writes
    Primary,
    /// Read-only, eventually consistent
    Replica,
    /// Refused, timed out, or answered with something we can't classify
    Unreachable,
}

impl NodeRole {
    /// Classify the `role:` field of a replication report
    pub fn from_role_field(role: &str) -> Self {
        match role.trim() {
            "master" | "primary" => Self::Primary,
            "slave" | "replica" => Self::Replica,
            _ => Self::Unreachable,
        }
    }
}

/// Key namespaces kept apart in both storage tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Challenge,
    Session,
}

impl Namespace {
    pub fn prefix(&self) -> &'static str {
        use crate::constants::store_keys;
        match self {
            Self::Challenge => store_keys::CHALLENGE_NAMESPACE,
            Self::Session => store_keys::SESSION_NAMESPACE,
        }
    }
}

/// Which tier is currently serving requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageBackend {
    #[serde(rename = "redis")]
    Remote,
    #[serde(rename = "in-memory")]
    Local,
}

/// Result body of a solution submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationResult {
    pub fn accepted(redirect: impl Into<String>) -> Self {
        Self {
            success: true,
            redirect: Some(redirect.into()),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            redirect: None,
            error: Some(error.into()),
        }
    }
}
