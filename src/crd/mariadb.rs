use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{
    Condition, ResourceRequirements, SecretKeySelector, condition_types, find_condition,
    is_condition_true,
};

/// MariaDB is the Schema for the mariadbs API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "database.mmontes.io",
    version = "v1alpha1",
    kind = "MariaDB",
    plural = "mariadbs",
    shortname = "mdb",
    namespaced,
    status = "MariaDBStatus",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name":"Galera", "type":"string", "jsonPath":".status.conditions[?(@.type==\"GaleraReady\")].status"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBSpec {
    /// Secret key holding the root password
    pub root_password_secret_key_ref: SecretKeySelector,

    /// Database created on first start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Container image
    pub image: Image,

    /// Port the server listens on
    #[serde(default = "default_port")]
    pub port: i32,

    /// Number of server pods
    /// - 1 = standalone server
    /// - 3+ = Galera replication group (an odd count keeps a majority on partition)
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Storage for the data directory
    pub storage: Storage,

    /// Galera replication. Absent means a standalone server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub galera: Option<GaleraSpec>,

    /// Extra my.cnf content appended to the generated configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub my_cnf: Option<String>,

    /// Resource requirements for server pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Stop reconciling this cluster
    #[serde(default)]
    pub suspend: bool,
}

fn default_port() -> i32 {
    3306
}

fn default_replicas() -> i32 {
    1
}

/// Container image reference
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub repository: String,

    #[serde(default = "default_tag")]
    pub tag: String,

    /// Always, IfNotPresent or Never
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_policy: Option<String>,
}

fn default_tag() -> String {
    "latest".to_string()
}

impl Image {
    /// Full image reference as used in a container spec
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }
}

/// Storage configuration for the data volume
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Storage {
    /// Storage class name (uses default if not specified)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    /// Size of the persistent volume (e.g., "10Gi")
    pub size: String,
}

/// Galera replication settings
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GaleraSpec {
    /// Member agent sidecar
    #[serde(default)]
    pub agent: AgentSpec,

    /// State snapshot transfer method
    #[serde(default = "default_sst")]
    pub sst: String,
}

impl Default for GaleraSpec {
    fn default() -> Self {
        Self {
            agent: AgentSpec::default(),
            sst: default_sst(),
        }
    }
}

fn default_sst() -> String {
    "mariabackup".to_string()
}

/// Member agent sidecar running next to every server container
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    /// Agent image (defaults to the server image)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Image>,

    /// HTTP port the agent listens on
    #[serde(default = "default_agent_port")]
    pub port: i32,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            image: None,
            port: default_agent_port(),
        }
    }
}

fn default_agent_port() -> i32 {
    5555
}

/// Status of the MariaDB
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MariaDBStatus {
    /// Kubernetes-style conditions, at most one per type
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Ready replicas reported by the StatefulSet
    #[serde(default)]
    pub ready_replicas: i32,

    /// Observed generation of the resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl MariaDBStatus {
    pub fn is_ready(&self) -> bool {
        is_condition_true(&self.conditions, condition_types::READY)
    }

    pub fn galera_condition(&self) -> Option<&Condition> {
        find_condition(&self.conditions, condition_types::GALERA_READY)
    }
}

impl MariaDB {
    /// Status, or an empty one when the object has never been reconciled
    pub fn status_or_default(&self) -> MariaDBStatus {
        self.status.clone().unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(MariaDBStatus::is_ready)
    }

    /// Name of the client Service
    pub fn service_name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    /// Name of the headless Service giving every pod a stable DNS name
    pub fn internal_service_name(&self) -> String {
        format!("{}-internal", self.service_name())
    }

    /// Name of the generated configuration ConfigMap
    pub fn config_map_name(&self) -> String {
        format!("{}-config", self.service_name())
    }
}
