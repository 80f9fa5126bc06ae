//! Shared constants for Warden components.

/// Default remote store node
pub const DEFAULT_REDIS_NODE: &str = "127.0.0.1:6379";

/// Default Warden HTTP listen address
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8888";

/// Default challenge validity (5 minutes)
pub const DEFAULT_CHALLENGE_TTL_SECS: u64 = 300;

/// Default session validity (30 minutes)
pub const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

/// Default proof-of-work difficulty (leading hex zeros)
pub const DEFAULT_DIFFICULTY: u8 = 4;

/// Extra storage lifetime beyond a record's own `expires_at`, so expiry is
/// decided by the record and not by the tier that holds it
pub const STORE_TTL_GRACE_SECS: u64 = 60;

/// Per-operation connect/read/write timeout for the remote store (milliseconds)
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 500;

/// How long the remote tier is skipped after it is found unusable
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

/// Topology discovery interval (seconds)
pub const DEFAULT_DISCOVERY_INTERVAL_SECS: u64 = 5;

/// Local fallback tier sweep interval (seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Session cookie name
pub const SESSION_COOKIE: &str = "warden_session";

/// Where a successfully verified client is sent
pub const SUCCESS_REDIRECT: &str = "/";

/// Remote store key layout
pub mod store_keys {
    /// Global prefix for every key Warden writes
    pub const KEY_PREFIX: &str = "warden:";

    /// Challenge: {prefix}challenge:{id}
    pub const CHALLENGE_NAMESPACE: &str = "challenge:";

    /// Session: {prefix}session:{token}
    pub const SESSION_NAMESPACE: &str = "session:";
}
