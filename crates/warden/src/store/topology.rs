//! Topology discovery and health tracking for the remote tier.
//!
//! Given the configured candidate nodes, works out which one is the primary
//! and which are replicas, caches the result, and keeps a process-wide
//! "down until" timestamp so an unreachable store isn't hammered.
//!
//! Discovery cycle:
//! 1. Inside the cooldown window: no I/O, keep whatever is known.
//! 2. Probe every node with `INFO replication` and classify its role.
//! 3. A primary was found: publish it with the replicas, clear the cooldown.
//! 4. No primary: start a cooldown and mark the previous topology stale.
//!
//! Discovery never fails; it only updates the shared state that the routing
//! facade reads through [`HealthSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::RwLock;
use warden_common::NodeRole;

use super::resp::Reply;
use super::transport;
use crate::clock::Clock;

/// A probed node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub address: String,
    pub role: NodeRole,
}

/// Result of a discovery cycle that found a primary
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    pub primary: Option<String>,
    /// Replicas in configuration order
    pub replicas: Vec<String>,
    /// Every probed node, unreachable ones included
    pub nodes: Vec<Node>,
}

/// Where remote operations may be sent right now
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub primary: String,
    pub replicas: Vec<String>,
}

/// Consistent view of the shared health state, taken under one lock
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub now_ms: i64,
    pub down_until_ms: i64,
    pub topology: Option<Topology>,
    pub stale: bool,
}

impl HealthSnapshot {
    pub fn in_cooldown(&self) -> bool {
        self.now_ms < self.down_until_ms
    }

    /// Usable route, if any. Stale topology is never routable.
    pub fn route(&self) -> Option<Route> {
        if self.in_cooldown() || self.stale {
            return None;
        }
        let topology = self.topology.as_ref()?;
        Some(Route {
            primary: topology.primary.clone()?,
            replicas: topology.replicas.clone(),
        })
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    down_until_ms: i64,
    topology: Option<Topology>,
    stale: bool,
    last_discovery_ms: Option<i64>,
}

/// Owns the process-wide topology and cooldown state
pub struct TopologyTracker {
    nodes: Vec<String>,
    timeout: Duration,
    cooldown: Duration,
    interval: Duration,
    clock: Arc<dyn Clock>,
    state: RwLock<TrackerState>,
}

impl TopologyTracker {
    pub fn new(
        nodes: Vec<String>,
        timeout: Duration,
        cooldown: Duration,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            nodes: nodes.iter().map(|n| normalize_address(n)).collect(),
            timeout,
            cooldown,
            interval,
            clock,
            state: RwLock::new(TrackerState::default()),
        }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.read().await;
        HealthSnapshot {
            now_ms: self.clock.timestamp_millis(),
            down_until_ms: state.down_until_ms,
            topology: state.topology.clone(),
            stale: state.stale,
        }
    }

    /// Current route, running discovery first if the cached one is due
    pub async fn route(&self) -> Option<Route> {
        self.refresh().await;
        self.snapshot().await.route()
    }

    /// Run discovery if the interval has elapsed since the last cycle
    pub async fn refresh(&self) {
        let due = {
            let state = self.state.read().await;
            self.is_due(&state, self.clock.timestamp_millis())
        };

        if due {
            self.discover(false).await;
        }
    }

    /// Out-of-band discovery after a failed remote operation
    pub async fn force_discovery(&self) {
        tracing::debug!("Forcing out-of-band discovery");
        self.discover(true).await;
    }

    fn is_due(&self, state: &TrackerState, now: i64) -> bool {
        match state.last_discovery_ms {
            None => true,
            Some(last) => now - last >= self.interval.as_millis() as i64,
        }
    }

    /// A remote operation succeeded: the tier is up
    pub async fn mark_up(&self) {
        let needs_reset = self.state.read().await.down_until_ms != 0;
        if needs_reset {
            self.state.write().await.down_until_ms = 0;
            tracing::info!("Remote store marked up");
        }
    }

    async fn discover(&self, forced: bool) {
        {
            let mut state = self.state.write().await;
            let now = self.clock.timestamp_millis();
            if now < state.down_until_ms {
                tracing::trace!(
                    remaining_ms = state.down_until_ms - now,
                    "Remote store in cooldown, skipping discovery"
                );
                return;
            }
            // Another caller claimed this interval between our read and write
            if !forced && !self.is_due(&state, now) {
                return;
            }
            // Claim this cycle so concurrent callers don't all probe
            state.last_discovery_ms = Some(now);
        }

        let nodes = join_all(self.nodes.iter().map(|addr| probe(addr, self.timeout))).await;

        let mut primaries = nodes
            .iter()
            .filter(|n| n.role == NodeRole::Primary)
            .map(|n| n.address.clone());
        let primary = primaries.next();
        let extra_primaries: Vec<String> = primaries.collect();
        if !extra_primaries.is_empty() {
            tracing::warn!(
                primary = ?primary,
                ignored = ?extra_primaries,
                "Multiple nodes report the primary role, using the first configured"
            );
        }

        let replicas: Vec<String> = nodes
            .iter()
            .filter(|n| n.role == NodeRole::Replica)
            .map(|n| n.address.clone())
            .collect();

        let mut state = self.state.write().await;
        match primary {
            Some(primary) => {
                let topology = Topology {
                    primary: Some(primary.clone()),
                    replicas,
                    nodes,
                };
                if state.stale || state.down_until_ms != 0 || state.topology.as_ref() != Some(&topology) {
                    tracing::info!(
                        primary = %primary,
                        replicas = ?topology.replicas,
                        "Remote store topology published"
                    );
                }
                state.topology = Some(topology);
                state.stale = false;
                state.down_until_ms = 0;
            }
            None => {
                let now = self.clock.timestamp_millis();
                state.down_until_ms = now + self.cooldown.as_millis() as i64;
                state.stale = true;
                tracing::warn!(
                    nodes = ?nodes,
                    cooldown = ?self.cooldown,
                    "No primary available, remote store marked down"
                );
            }
        }
    }
}

/// Ask one node for its role
async fn probe(address: &str, timeout: Duration) -> Node {
    let role = match transport::execute(address, timeout, vec!["INFO", "replication"]).await {
        Ok(Reply::Bulk(Some(info))) => parse_role(&String::from_utf8_lossy(&info)),
        Ok(other) => {
            tracing::debug!(node = %address, reply = ?other, "Unexpected role reply");
            NodeRole::Unreachable
        }
        Err(e) => {
            tracing::debug!(node = %address, error = %e, "Node probe failed");
            NodeRole::Unreachable
        }
    };

    tracing::trace!(node = %address, role = ?role, "Probed node");

    Node {
        address: address.to_string(),
        role,
    }
}

/// Extract the `role:` field of an `INFO replication` report
fn parse_role(info: &str) -> NodeRole {
    info.lines()
        .find_map(|line| line.strip_prefix("role:"))
        .map(NodeRole::from_role_field)
        .unwrap_or(NodeRole::Unreachable)
}

/// Accept `host:port` or `redis://host:port[/]`
pub fn normalize_address(address: &str) -> String {
    let address = address.trim();
    let address = address.strip_prefix("redis://").unwrap_or(address);
    address.trim_end_matches('/').to_string()
}

/// Background worker that keeps the topology warm
pub async fn discovery_worker(
    tracker: Arc<TopologyTracker>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(
        nodes = ?tracker.nodes(),
        interval = ?tracker.interval,
        "Discovery worker started"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(tracker.interval) => {
                tracker.refresh().await;
            }
            _ = shutdown.recv() => {
                tracing::info!("Discovery worker shutting down");
                break;
            }
        }
    }
}
