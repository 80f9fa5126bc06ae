//! Configuration management for Warden.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use warden_common::constants::{
    self, DEFAULT_LISTEN_ADDR, DEFAULT_REDIS_NODE, SESSION_COOKIE, store_keys,
};

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Remote store and fallback tier
    #[serde(default)]
    pub storage: StorageConfig,

    /// Proof-of-work challenges
    #[serde(default)]
    pub challenge: ChallengeConfig,

    /// Sessions granted after verification
    #[serde(default)]
    pub session: SessionConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Use the remote tier at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Candidate nodes (`host:port` or `redis://host:port`)
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Per-operation connect/read/write timeout
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long to skip the remote tier once it is found down
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Minimum time between discovery cycles
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_secs: u64,

    /// Local fallback sweep interval
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Prefix for every remote key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl StorageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs.max(1))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nodes: default_nodes(),
            timeout_ms: default_timeout_ms(),
            cooldown_secs: default_cooldown(),
            discovery_interval_secs: default_discovery_interval(),
            sweep_interval_secs: default_sweep_interval(),
            key_prefix: default_key_prefix(),
        }
    }
}

/// Challenge configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChallengeConfig {
    /// Required leading zero hex characters
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,

    /// Challenge validity in seconds
    #[serde(default = "default_challenge_ttl")]
    pub ttl_secs: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            difficulty: default_difficulty(),
            ttl_secs: default_challenge_ttl(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session validity in seconds
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,

    /// Cookie carrying the session token
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl(),
            cookie_name: default_cookie_name(),
        }
    }
}

// Default value functions
fn default_listen_addr() -> String { DEFAULT_LISTEN_ADDR.to_string() }
fn default_true() -> bool { true }
fn default_nodes() -> Vec<String> { vec![DEFAULT_REDIS_NODE.to_string()] }
fn default_timeout_ms() -> u64 { constants::DEFAULT_STORE_TIMEOUT_MS }
fn default_cooldown() -> u64 { constants::DEFAULT_COOLDOWN_SECS }
fn default_discovery_interval() -> u64 { constants::DEFAULT_DISCOVERY_INTERVAL_SECS }
fn default_sweep_interval() -> u64 { constants::DEFAULT_SWEEP_INTERVAL_SECS }
fn default_key_prefix() -> String { store_keys::KEY_PREFIX.to_string() }
fn default_difficulty() -> u8 { constants::DEFAULT_DIFFICULTY }
fn default_challenge_ttl() -> u64 { constants::DEFAULT_CHALLENGE_TTL_SECS } // 5 minutes
fn default_session_ttl() -> u64 { constants::DEFAULT_SESSION_TTL_SECS } // 30 minutes
fn default_cookie_name() -> String { SESSION_COOKIE.to_string() }

impl AppConfig {
    /// Load configuration from file and `WARDEN__*` environment, with CLI overrides
    pub fn load(config_path: &str, args: &super::Args) -> Result<Self> {
        let mut builder = config::Config::builder();
        if Path::new(config_path).exists() {
            builder = builder.add_source(config::File::with_name(config_path));
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("WARDEN")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .context("Failed to load config")?;

        let mut config: AppConfig = settings
            .try_deserialize()
            .context("Failed to parse config")?;

        // Apply CLI overrides
        if let Some(ref listen) = args.listen {
            config.listen_addr = listen.clone();
        }
        if !args.redis_nodes.is_empty() {
            config.storage.nodes = args.redis_nodes.clone();
        }
        if let Some(enabled) = args.redis_enabled {
            config.storage.enabled = enabled;
        }
        if let Some(difficulty) = args.difficulty {
            config.challenge.difficulty = difficulty;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.storage.enabled && self.storage.nodes.is_empty() {
            anyhow::bail!("storage.enabled is set but no storage.nodes are configured");
        }
        if self.challenge.ttl_secs == 0 || self.session.ttl_secs == 0 {
            anyhow::bail!("challenge and session TTLs must be positive");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            storage: StorageConfig::default(),
            challenge: ChallengeConfig::default(),
            session: SessionConfig::default(),
        }
    }
}
