use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use kube::Client;

use crate::agent::{AgentClient, HttpAgentClient};
use crate::config::OperatorConfig;
use crate::controller::error::BackoffConfig;
use crate::controller::store::{ClusterStore, KubeStore, ResourceStore, SqlJobStore};
use crate::health::HealthState;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Timing knobs for a reconcile pass
#[derive(Clone, Debug)]
pub struct ReconcileSettings {
    /// Deadline for one whole pass
    pub pass_timeout: Duration,
    /// Requeue interval once everything converged
    pub requeue_interval: Duration,
    /// Requeue interval while waiting on pods, agents or dependencies
    pub pending_requeue_interval: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            pass_timeout: Duration::from_secs(60),
            requeue_interval: Duration::from_secs(300),
            pending_requeue_interval: Duration::from_secs(10),
        }
    }
}

impl From<&OperatorConfig> for ReconcileSettings {
    fn from(config: &OperatorConfig) -> Self {
        Self {
            pass_timeout: config.reconcile_timeout,
            requeue_interval: config.requeue_interval,
            ..Self::default()
        }
    }
}

/// Shared context for the controllers
#[derive(Clone)]
pub struct Context {
    pub clusters: Arc<dyn ClusterStore>,
    pub resources: Arc<dyn ResourceStore>,
    pub sql_jobs: Arc<dyn SqlJobStore>,
    pub agent: Arc<dyn AgentClient>,
    pub clock: Arc<dyn Clock>,
    pub settings: ReconcileSettings,
    pub backoff: BackoffConfig,
    /// Health state for recording metrics (optional)
    pub health_state: Option<Arc<HealthState>>,
    /// Consecutive failures per object, reset on success
    attempts: Arc<DashMap<String, u32>>,
}

impl Context {
    /// Context talking to the cluster through `client` and to agents over HTTP
    pub fn new(
        client: Client,
        config: &OperatorConfig,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        let store = Arc::new(KubeStore::new(client));
        Self {
            clusters: store.clone(),
            resources: store.clone(),
            sql_jobs: store,
            agent: Arc::new(HttpAgentClient::new(config.agent_timeout)),
            clock: Arc::new(SystemClock),
            settings: ReconcileSettings::from(config),
            backoff: BackoffConfig::default(),
            health_state,
            attempts: Arc::new(DashMap::new()),
        }
    }

    /// Context assembled from explicit collaborators
    pub fn from_parts(
        clusters: Arc<dyn ClusterStore>,
        resources: Arc<dyn ResourceStore>,
        sql_jobs: Arc<dyn SqlJobStore>,
        agent: Arc<dyn AgentClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            clusters,
            resources,
            sql_jobs,
            agent,
            clock,
            settings: ReconcileSettings::default(),
            backoff: BackoffConfig::default(),
            health_state: None,
            attempts: Arc::new(DashMap::new()),
        }
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Record a failure for `key`, returning the attempt number to back off with
    pub fn record_failure(&self, key: &str) -> u32 {
        let mut entry = self.attempts.entry(key.to_string()).or_insert(0);
        let attempt = *entry;
        *entry = attempt.saturating_add(1);
        attempt
    }

    pub fn reset_failures(&self, key: &str) {
        self.attempts.remove(key);
    }

    pub fn failure_count(&self, key: &str) -> u32 {
        self.attempts.get(key).map(|v| *v).unwrap_or(0)
    }
}
