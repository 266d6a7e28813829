//! Node-status cache: mirrors the remote status source and tracks its health.
//!
//! Reads ([`StatusCache::snapshot`], [`StatusCache::health`]) only ever see
//! cached data and never reach the network. The only writers are the
//! scheduler tick and the standalone refresh loop, both going through
//! [`StatusCache::refresh`], which serialises them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nodepilot_core::config::StatusConfig;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};
use crate::types::{ApiHealth, NodeStatus, StatusSnapshot};

/// Body returned by the status source. A body without `nodes` is a failed
/// poll; each node is decoded on its own so one bad record cannot sink the
/// rest.
#[derive(Debug, Deserialize)]
struct NodesEnvelope {
    nodes: HashMap<String, Value>,
}

/// One node as reported on the wire. Every field is optional and read
/// leniently: numbers may arrive as strings, and unusable gauges become 0.
#[derive(Debug, Default, Deserialize)]
struct WireNode {
    #[serde(default, deserialize_with = "lenient::text")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    os: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    ip: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    lastbootuptime: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient::gauge")]
    conn: Option<f64>,
    #[serde(default, deserialize_with = "lenient::gauge")]
    pwr: Option<f64>,
}

impl WireNode {
    /// Decode one entry of the `nodes` map. Only JSON objects are accepted.
    fn decode(raw: Value) -> std::result::Result<Self, String> {
        if !raw.is_object() {
            return Err(format!("expected an object, got {raw}"));
        }
        serde_json::from_value(raw).map_err(|e| e.to_string())
    }

    fn into_status(self, node_id: String, polled_at: DateTime<Utc>) -> NodeStatus {
        NodeStatus {
            node_id,
            name: self.name.unwrap_or_default(),
            os: self.os.unwrap_or_default(),
            ip: self.ip.unwrap_or_default(),
            last_boot_time: self.lastbootuptime.unwrap_or_default(),
            status: self.status.unwrap_or_default(),
            conn: self
                .conn
                .filter(|c| c.is_finite() && *c > 0.0)
                .map_or(0, |c| c as u32),
            pwr: self.pwr.filter(|p| p.is_finite()).unwrap_or(0.0),
            last_updated: polled_at,
        }
    }
}

mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })
    }

    pub fn gauge<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
    }
}

pub struct StatusCache {
    client: reqwest::Client,
    source_url: String,
    degraded_threshold: u32,
    nodes: DashMap<String, NodeStatus>,
    health: RwLock<ApiHealth>,
    /// Held for the whole poll so concurrent refreshes apply one at a time.
    writer: Mutex<()>,
}

impl StatusCache {
    pub fn new(source_url: &str, timeout: Duration, degraded_threshold: u32) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            source_url: source_url.to_string(),
            degraded_threshold,
            nodes: DashMap::new(),
            health: RwLock::new(ApiHealth::new()),
            writer: Mutex::new(()),
        })
    }

    pub fn from_config(config: &StatusConfig) -> Result<Self> {
        Self::new(
            &config.url,
            Duration::from_secs(config.timeout_secs),
            config.degraded_threshold,
        )
    }

    /// Poll the status source once. Failures are absorbed into [`ApiHealth`];
    /// cached rows are left untouched so readers keep the last good data.
    pub async fn refresh(&self) {
        let _writer = self.writer.lock().await;

        match self.fetch().await {
            Ok(nodes) => {
                let polled_at = Utc::now();
                let mut count = 0usize;
                for (node_id, raw) in nodes {
                    match WireNode::decode(raw) {
                        Ok(wire) => {
                            let status = wire.into_status(node_id.clone(), polled_at);
                            self.nodes.insert(node_id, status);
                            count += 1;
                        }
                        Err(e) => warn!(%node_id, "skipping unreadable node record: {e}"),
                    }
                }
                let recovered = {
                    let mut health = self.health_mut();
                    let was_down = !health.is_working;
                    health.record_success(polled_at);
                    was_down
                };
                if recovered {
                    info!(nodes = count, "node status API recovered");
                } else {
                    debug!(nodes = count, "node status refreshed");
                }
            }
            Err(e) => {
                let (failures, degraded) = {
                    let mut health = self.health_mut();
                    let degraded = health.record_failure(e.to_string(), self.degraded_threshold);
                    (health.consecutive_failures, degraded)
                };
                if degraded {
                    warn!(
                        failures,
                        err = %e,
                        "node status API down for {failures} consecutive polls; serving cached data"
                    );
                } else {
                    warn!(failures, err = %e, "node status refresh failed");
                }
            }
        }
    }

    async fn fetch(&self) -> Result<HashMap<String, Value>> {
        let resp = self.client.get(&self.source_url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(SchedulerError::StatusSource(format!(
                "{} answered {status}",
                self.source_url
            )));
        }
        let body: NodesEnvelope = resp.json().await?;
        Ok(body.nodes)
    }

    /// All cached nodes (ordered by node id) plus current health. Never polls.
    pub fn snapshot(&self) -> StatusSnapshot {
        let mut nodes: Vec<NodeStatus> = self.nodes.iter().map(|e| e.value().clone()).collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        StatusSnapshot {
            nodes,
            health: self.health(),
        }
    }

    pub fn health(&self) -> ApiHealth {
        self.health
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn node(&self, node_id: &str) -> Option<NodeStatus> {
        self.nodes.get(node_id).map(|e| e.value().clone())
    }

    fn health_mut(&self) -> std::sync::RwLockWriteGuard<'_, ApiHealth> {
        self.health
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Standalone refresh trigger, independent of scheduler ticks. Polls once
    /// immediately, then every `every` until `shutdown` flips to `true`.
    pub fn spawn_refresh_loop(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(every_secs = every.as_secs(), "status refresh loop started");
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => self.refresh().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("status refresh loop shutting down");
                            break;
                        }
                    }
                }
            }
        })
    }
}
