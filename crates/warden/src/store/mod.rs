//! Dual-tier key/value store.
//!
//! Writes go to the remote primary, reads try replicas first and then the
//! primary. Whenever the remote tier is in cooldown, has no primary, or a
//! remote call fails, the process-local tier takes over. A remote outage
//! never fails an operation.
//!
//! Nothing written locally during an outage is pushed to the remote tier
//! afterwards; it simply ages out.

pub mod local;
pub mod resp;
pub mod topology;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use std::time::Duration;

use warden_common::{Namespace, StorageBackend, StoreError};

use crate::clock::Clock;
use crate::config::StorageConfig;
use local::LocalStore;
use resp::Reply;
use topology::TopologyTracker;

/// A namespaced key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub namespace: Namespace,
    pub id: String,
}

impl Key {
    pub fn challenge(id: &str) -> Self {
        Self {
            namespace: Namespace::Challenge,
            id: id.to_string(),
        }
    }

    pub fn session(token: &str) -> Self {
        Self {
            namespace: Namespace::Session,
            id: token.to_string(),
        }
    }
}

/// Routing facade over the remote and local tiers
pub struct Store {
    remote: Option<Arc<TopologyTracker>>,
    local: Arc<LocalStore>,
    key_prefix: String,
}

impl Store {
    pub fn new(config: &StorageConfig, clock: Arc<dyn Clock>) -> Self {
        let remote = config.enabled.then(|| {
            Arc::new(TopologyTracker::new(
                config.nodes.clone(),
                config.timeout(),
                config.cooldown(),
                config.discovery_interval(),
                clock.clone(),
            ))
        });

        Self {
            remote,
            local: Arc::new(LocalStore::new(clock)),
            key_prefix: config.key_prefix.clone(),
        }
    }

    /// Store that never touches the network
    #[cfg(test)]
    pub fn local_only(clock: Arc<dyn Clock>) -> Self {
        let config = StorageConfig {
            enabled: false,
            ..Default::default()
        };
        Self::new(&config, clock)
    }

    pub fn tracker(&self) -> Option<&Arc<TopologyTracker>> {
        self.remote.as_ref()
    }

    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// Fully-qualified remote key
    pub fn qualify(&self, key: &Key) -> String {
        format!("{}{}{}", self.key_prefix, key.namespace.prefix(), key.id)
    }

    /// Which tier would serve a request right now (no I/O)
    pub async fn backend(&self) -> StorageBackend {
        match &self.remote {
            Some(tracker) if tracker.snapshot().await.route().is_some() => StorageBackend::Remote,
            _ => StorageBackend::Local,
        }
    }

    pub async fn set(&self, key: &Key, value: &str, ttl_secs: u64) {
        let ttl_secs = ttl_secs.max(1);

        if let Some(tracker) = &self.remote {
            let qualified = self.qualify(key);
            let ttl = ttl_secs.to_string();
            let result = self
                .write_remote(tracker, &["SET", qualified.as_str(), value, "EX", ttl.as_str()])
                .await
                .and_then(|reply| match reply {
                    Reply::Status(ref s) if s == "OK" => Ok(()),
                    other => Err(unexpected(&other)),
                });

            match result {
                Ok(()) => return,
                Err(e) => self.remote_failed(tracker, "SET", &qualified, e).await,
            }
        }

        self.local
            .set(key.namespace, &key.id, value, Duration::from_secs(ttl_secs))
            .await;
    }

    pub async fn get(&self, key: &Key) -> Option<String> {
        if self.local.is_buried(key.namespace, &key.id).await {
            return None;
        }

        if let Some(tracker) = &self.remote {
            let qualified = self.qualify(key);
            match self.read_remote(tracker, &["GET", qualified.as_str()], parse_bulk).await {
                Ok(Some(value)) => return Some(value),
                // Remote miss: an outage-era local write may still be live
                Ok(None) => {}
                Err(e) => self.remote_failed(tracker, "GET", &qualified, e).await,
            }
        }

        self.local.get(key.namespace, &key.id).await
    }

    pub async fn exists(&self, key: &Key) -> bool {
        if self.local.is_buried(key.namespace, &key.id).await {
            return false;
        }

        if let Some(tracker) = &self.remote {
            let qualified = self.qualify(key);
            match self.read_remote(tracker, &["EXISTS", qualified.as_str()], parse_exists).await {
                Ok(Some(())) => return true,
                Ok(None) => {}
                Err(e) => self.remote_failed(tracker, "EXISTS", &qualified, e).await,
            }
        }

        self.local.exists(key.namespace, &key.id).await
    }

    /// Delete from both tiers.
    ///
    /// Returns `false` when a remote copy may have survived (remote delete
    /// failed or was skipped); callers that need the key gone for good follow
    /// up with [`Store::bury`].
    pub async fn delete(&self, key: &Key) -> bool {
        let mut confirmed = true;

        if let Some(tracker) = &self.remote {
            let qualified = self.qualify(key);
            let result = self
                .write_remote(tracker, &["DEL", qualified.as_str()])
                .await
                .and_then(|reply| match reply {
                    Reply::Integer(_) => Ok(()),
                    other => Err(unexpected(&other)),
                });

            if let Err(e) = result {
                self.remote_failed(tracker, "DEL", &qualified, e).await;
                confirmed = false;
            }
        }

        // A local copy must never outlive a consumed remote one
        self.local.delete(key.namespace, &key.id).await;
        confirmed
    }

    /// Treat `key` as absent in every tier for `ttl`, whatever the remote
    /// tier still holds
    pub async fn bury(&self, key: &Key, ttl: Duration) {
        tracing::debug!(key = %self.qualify(key), ttl = ?ttl, "Tombstoned key");
        self.local.bury(key.namespace, &key.id, ttl).await;
    }

    /// Run a write against the primary
    async fn write_remote(
        &self,
        tracker: &TopologyTracker,
        command: &[&str],
    ) -> Result<Reply, StoreError> {
        let route = tracker.route().await.ok_or(StoreError::NoPrimaryAvailable)?;

        let reply = transport::execute(&route.primary, tracker.timeout(), command.to_vec()).await?;
        if let Reply::Error(e) = &reply {
            return Err(StoreError::Protocol(e.clone()));
        }

        tracker.mark_up().await;
        Ok(reply)
    }

    /// Run a read against replicas in order, then the primary.
    ///
    /// Returns the first hit; `Ok(None)` if at least one node answered but
    /// none had the key; the last error if no node answered at all.
    async fn read_remote<T>(
        &self,
        tracker: &TopologyTracker,
        command: &[&str],
        parse: fn(Reply) -> Result<Option<T>, StoreError>,
    ) -> Result<Option<T>, StoreError> {
        let route = tracker.route().await.ok_or(StoreError::NoPrimaryAvailable)?;

        let mut answered = false;
        let mut failed = 0;
        let mut last_error = StoreError::NoPrimaryAvailable;
        let mut found = None;

        for address in route.replicas.iter().chain(std::iter::once(&route.primary)) {
            let result = transport::execute(address, tracker.timeout(), command.to_vec())
                .await
                .and_then(parse);

            match result {
                Ok(hit) => {
                    answered = true;
                    tracker.mark_up().await;
                    if hit.is_some() {
                        found = hit;
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(node = %address, command = command[0], error = %e, "Remote read failed, trying next node");
                    failed += 1;
                    last_error = e;
                }
            }
        }

        if !answered {
            return Err(last_error);
        }

        // Some node is dead but the tier still serves: reroute around it now
        // rather than paying its timeout on every read until the next cycle
        if failed > 0 {
            tracing::info!(failed = failed, "Remote read hit unreachable nodes, rediscovering");
            tracker.force_discovery().await;
        }
        Ok(found)
    }

    async fn remote_failed(&self, tracker: &TopologyTracker, op: &str, key: &str, err: StoreError) {
        match err {
            // Cooldown or stale topology: expected, no point rediscovering
            StoreError::NoPrimaryAvailable => {
                tracing::debug!(op = op, key = %key, "Remote store unavailable, using local tier");
            }
            e => {
                tracing::warn!(op = op, key = %key, error = %e, "Remote store call failed, using local tier");
                tracker.force_discovery().await;
            }
        }
    }
}

fn parse_bulk(reply: Reply) -> Result<Option<String>, StoreError> {
    if reply.is_null() {
        return Ok(None);
    }
    match reply {
        Reply::Bulk(Some(data)) => String::from_utf8(data)
            .map(Some)
            .map_err(|_| StoreError::Protocol("value is not valid UTF-8".to_string())),
        other => Err(unexpected(&other)),
    }
}

fn parse_exists(reply: Reply) -> Result<Option<()>, StoreError> {
    match reply {
        Reply::Integer(n) if n > 0 => Ok(Some(())),
        Reply::Integer(_) => Ok(None),
        other => Err(unexpected(&other)),
    }
}

fn unexpected(reply: &Reply) -> StoreError {
    match reply {
        Reply::Error(e) => StoreError::Protocol(e.clone()),
        other => StoreError::Protocol(format!("unexpected reply {:?}", other)),
    }
}
