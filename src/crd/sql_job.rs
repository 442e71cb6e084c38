use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{
    Condition, ConfigMapKeySelector, LocalObjectReference, ResourceRequirements,
    SecretKeySelector, condition_types, find_condition,
};

/// SqlJob runs SQL against a MariaDB, once or on a cron schedule
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq)]
#[kube(
    group = "database.mmontes.io",
    version = "v1alpha1",
    kind = "SqlJob",
    plural = "sqljobs",
    shortname = "sqj",
    namespaced,
    status = "SqlJobStatus",
    printcolumn = r#"{"name":"Complete", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Complete\")].status"}"#,
    printcolumn = r#"{"name":"MariaDB", "type":"string", "jsonPath":".spec.mariaDbRef.name"}"#,
    printcolumn = r#"{"name":"Schedule", "type":"string", "jsonPath":".spec.schedule.cron"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SqlJobSpec {
    /// MariaDB the SQL runs against
    pub maria_db_ref: LocalObjectReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    /// Inline SQL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,

    /// SQL stored in a ConfigMap key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_config_map_key_ref: Option<ConfigMapKeySelector>,

    pub username: String,

    pub password_secret_key_ref: SecretKeySelector,

    /// Cron schedule. Absent means the job runs exactly once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,

    /// SqlJobs that must have succeeded at least once before this one runs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<LocalObjectReference>,

    #[serde(default = "default_backoff_limit")]
    pub backoff_limit: i32,

    /// OnFailure or Never
    #[serde(default = "default_restart_policy")]
    pub restart_policy: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

fn default_backoff_limit() -> i32 {
    5
}

fn default_restart_policy() -> String {
    "OnFailure".to_string()
}

/// Cron schedule of a SqlJob
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Five-field cron expression or a descriptor such as @hourly
    pub cron: String,

    #[serde(default)]
    pub suspend: bool,
}

/// Status of the SqlJob
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SqlJobStatus {
    /// Last time a Job was dispatched (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_schedule_time: Option<String>,

    /// Last time a dispatched Job succeeded (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_success_time: Option<String>,

    /// Name of the Job currently running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_job: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl SqlJobStatus {
    pub fn complete_condition(&self) -> Option<&Condition> {
        find_condition(&self.conditions, condition_types::COMPLETE)
    }
}

impl SqlJob {
    pub fn status_or_default(&self) -> SqlJobStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Whether any run of this job has succeeded
    pub fn has_succeeded(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.last_success_time.is_some())
    }
}
