//! Operator configuration read from the environment

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidNumber { name: &'static str, value: String },
}

/// Process-wide settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Identity used for leader election
    pub pod_name: String,
    /// Namespace holding the leader election lease
    pub pod_namespace: String,
    /// Restrict watches to one namespace (all namespaces when unset)
    pub watch_namespace: Option<String>,
    pub reconcile_timeout: Duration,
    pub requeue_interval: Duration,
    /// Per-request timeout for member agent calls
    pub agent_timeout: Duration,
    pub health_port: u16,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            pod_name: "mariadb-operator".to_string(),
            pod_namespace: "default".to_string(),
            watch_namespace: None,
            reconcile_timeout: Duration::from_secs(60),
            requeue_interval: Duration::from_secs(300),
            agent_timeout: Duration::from_secs(10),
            health_port: 8080,
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Fall back to the hostname when not running in a pod
        let pod_name = non_empty("POD_NAME")
            .or_else(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
            })
            .unwrap_or(defaults.pod_name);

        Ok(Self {
            pod_name,
            pod_namespace: non_empty("POD_NAMESPACE").unwrap_or(defaults.pod_namespace),
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            reconcile_timeout: secs(&non_empty, "RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout)?,
            requeue_interval: secs(&non_empty, "REQUEUE_INTERVAL_SECS", defaults.requeue_interval)?,
            agent_timeout: secs(&non_empty, "AGENT_TIMEOUT_SECS", defaults.agent_timeout)?,
            health_port: match non_empty("HEALTH_PORT") {
                Some(value) => value
                    .trim()
                    .parse::<u16>()
                    .ok()
                    .filter(|p| *p > 0)
                    .ok_or(ConfigError::InvalidNumber {
                        name: "HEALTH_PORT",
                        value,
                    })?,
                None => defaults.health_port,
            },
        })
    }
}

fn secs<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => match value.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(Duration::from_secs(n)),
            _ => Err(ConfigError::InvalidNumber { name, value }),
        },
        None => Ok(default),
    }
}
