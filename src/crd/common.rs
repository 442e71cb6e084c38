//! Types shared by the MariaDB and SqlJob resources

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a key inside a Secret in the same namespace
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    /// Name of the Secret
    pub name: String,
    /// Key within the Secret data
    pub key: String,
}

/// Reference to a key inside a ConfigMap in the same namespace
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapKeySelector {
    /// Name of the ConfigMap
    pub name: String,
    /// Key within the ConfigMap data
    #[serde(default)]
    pub key: String,
}

/// Reference to another object in the same namespace by name
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq, Hash)]
pub struct LocalObjectReference {
    pub name: String,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Resource requirements for generated pods
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    /// CPU and memory limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceList>,

    /// CPU and memory requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceList>,
}

/// Resource quantities for CPU and memory
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Default)]
pub struct ResourceList {
    /// CPU quantity (e.g., "500m", "2")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// Memory quantity (e.g., "512Mi", "2Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Status of a condition
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, Default)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionStatus::True => write!(f, "True"),
            ConditionStatus::False => write!(f, "False"),
            ConditionStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition: True, False, or Unknown
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition's last transition
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Last time the condition transitioned (RFC 3339)
    pub last_transition_time: String,

    /// Generation observed when condition was set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// Find a condition of the given type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether a condition of the given type exists and is True
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    find_condition(conditions, type_).is_some_and(|c| c.status == ConditionStatus::True)
}

/// Condition types used on MariaDB and SqlJob resources
pub mod condition_types {
    /// The cluster is serving traffic with every replica ready
    pub const READY: &str = "Ready";
    /// The Galera replication group is formed and bootstrap is disabled on every member
    pub const GALERA_READY: &str = "GaleraReady";
    /// A backup is being restored into the cluster
    pub const RESTORING_BACKUP: &str = "RestoringBackup";
    /// A SqlJob run finished
    pub const COMPLETE: &str = "Complete";
}

/// Condition reasons written by the operator
pub mod condition_reasons {
    pub const STATEFULSET_READY: &str = "StatefulSetReady";
    pub const STATEFULSET_NOT_READY: &str = "StatefulSetNotReady";
    pub const GALERA_NOT_READY: &str = "GaleraNotReady";
    /// The replication group has never been ready
    pub const BOOTSTRAPPING: &str = "Bootstrapping";
    /// A previously healthy replication group dropped to a minority of ready members
    pub const QUORUM_LOST: &str = "QuorumLost";
    pub const GALERA_READY: &str = "GaleraReady";
    pub const RESTORING_BACKUP: &str = "RestoringBackup";
    pub const JOB_COMPLETE: &str = "JobComplete";
    pub const JOB_FAILED: &str = "JobFailed";
    pub const JOB_RUNNING: &str = "JobRunning";
}
