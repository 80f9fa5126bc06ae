//! Process-local fallback tier.
//!
//! Two namespaced maps (challenges by id, sessions by token). Entries carry
//! their own expiry, which is checked lazily on lookup and opportunistically
//! by the periodic sweep.
//!
//! Tombstones mark keys whose remote delete could not be confirmed. While a
//! tombstone is live the routing facade treats the key as absent in every
//! tier, so a remote copy that outlived its delete is never served.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use warden_common::Namespace;

use crate::clock::Clock;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at_ms: i64,
}

impl Entry {
    fn is_live(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at_ms
    }
}

/// In-memory store used while the remote tier is unusable
pub struct LocalStore {
    challenges: RwLock<HashMap<String, Entry>>,
    sessions: RwLock<HashMap<String, Entry>>,
    /// Expiry (epoch ms) per buried key
    tombstones: RwLock<HashMap<(Namespace, String), i64>>,
    clock: Arc<dyn Clock>,
}

impl LocalStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            challenges: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
            tombstones: RwLock::new(HashMap::new()),
            clock,
        }
    }

    fn map(&self, namespace: Namespace) -> &RwLock<HashMap<String, Entry>> {
        match namespace {
            Namespace::Challenge => &self.challenges,
            Namespace::Session => &self.sessions,
        }
    }

    pub async fn set(&self, namespace: Namespace, id: &str, value: &str, ttl: Duration) {
        let expires_at_ms = self.clock.timestamp_millis() + ttl.as_millis() as i64;
        self.tombstones
            .write()
            .await
            .remove(&(namespace, id.to_string()));
        self.map(namespace).write().await.insert(
            id.to_string(),
            Entry {
                value: value.to_string(),
                expires_at_ms,
            },
        );
    }

    /// Live value, removing it if it has expired
    pub async fn get(&self, namespace: Namespace, id: &str) -> Option<String> {
        let now = self.clock.timestamp_millis();
        {
            let map = self.map(namespace).read().await;
            match map.get(id) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        // Expired: drop it unless someone replaced it meanwhile
        let mut map = self.map(namespace).write().await;
        if map.get(id).is_some_and(|e| !e.is_live(now)) {
            map.remove(id);
        }
        None
    }

    pub async fn exists(&self, namespace: Namespace, id: &str) -> bool {
        self.get(namespace, id).await.is_some()
    }

    pub async fn delete(&self, namespace: Namespace, id: &str) -> bool {
        self.map(namespace).write().await.remove(id).is_some()
    }

    /// Hide `id` from every tier for `ttl`
    pub async fn bury(&self, namespace: Namespace, id: &str, ttl: Duration) {
        let expires_at_ms = self.clock.timestamp_millis() + ttl.as_millis() as i64;
        self.tombstones
            .write()
            .await
            .insert((namespace, id.to_string()), expires_at_ms);
    }

    /// Whether a live tombstone covers `id`, dropping it once expired
    pub async fn is_buried(&self, namespace: Namespace, id: &str) -> bool {
        let now = self.clock.timestamp_millis();
        let key = (namespace, id.to_string());
        match self.tombstones.read().await.get(&key) {
            None => return false,
            Some(&expires_at_ms) if now < expires_at_ms => return true,
            Some(_) => {}
        }

        let mut tombstones = self.tombstones.write().await;
        if tombstones.get(&key).is_some_and(|&e| now >= e) {
            tombstones.remove(&key);
        }
        false
    }

    /// Unexpired entry count
    pub async fn len(&self, namespace: Namespace) -> usize {
        let now = self.clock.timestamp_millis();
        self.map(namespace)
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Remove expired entries and tombstones, returning how many went
    pub async fn sweep(&self) -> usize {
        let now = self.clock.timestamp_millis();
        let mut removed = 0;
        for namespace in [Namespace::Challenge, Namespace::Session] {
            let mut map = self.map(namespace).write().await;
            let before = map.len();
            map.retain(|_, e| e.is_live(now));
            removed += before - map.len();
        }

        let mut tombstones = self.tombstones.write().await;
        let before = tombstones.len();
        tombstones.retain(|_, &mut expires_at_ms| now < expires_at_ms);
        removed += before - tombstones.len();

        removed
    }
}

/// Background worker that sweeps expired local entries
pub async fn sweep_worker(
    local: Arc<LocalStore>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(interval = ?interval, "Local store sweeper started");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {
                let removed = local.sweep().await;
                if removed > 0 {
                    tracing::debug!(removed = removed, "Swept expired local entries");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Local store sweeper shutting down");
                break;
            }
        }
    }
}
