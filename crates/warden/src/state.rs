//! Application state and shared resources.

use std::sync::Arc;

use warden_common::{Difficulty, StorageBackend};

use crate::challenge::{ChallengeGenerator, ChallengeVerifier};
use crate::clock::Clock;
use crate::config::AppConfig;
use crate::sessions::SessionManager;
use crate::store::Store;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Dual-tier store (remote with local fallback)
    pub store: Arc<Store>,

    /// Difficulty handed out with new challenges
    pub difficulty: Difficulty,

    /// Challenge generator
    pub challenge_generator: Arc<ChallengeGenerator>,

    /// Challenge verifier
    pub challenge_verifier: Arc<ChallengeVerifier>,

    /// Session manager
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Create application state and run the first discovery cycle
    pub async fn new(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(Store::new(&config.storage, clock.clone()));

        if let Some(tracker) = store.tracker() {
            tracker.refresh().await;
        }
        match store.backend().await {
            StorageBackend::Remote => tracing::info!(nodes = ?config.storage.nodes, "Remote store connected"),
            StorageBackend::Local if config.storage.enabled => {
                tracing::warn!(nodes = ?config.storage.nodes, "Remote store unavailable, starting on the local tier")
            }
            StorageBackend::Local => tracing::info!("Remote store disabled, using the local tier only"),
        }

        let challenge_generator = Arc::new(ChallengeGenerator::new(
            config.challenge.ttl_secs,
            clock.clone(),
        ));
        let challenge_verifier = Arc::new(ChallengeVerifier::new(clock.clone()));
        let sessions = Arc::new(SessionManager::new(config.session.ttl_secs, clock));

        Self {
            difficulty: Difficulty::new(config.challenge.difficulty),
            config,
            store,
            challenge_generator,
            challenge_verifier,
            sessions,
        }
    }
}
