//! batch/v1 Jobs dispatched for SqlJob runs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, EnvVarSource, KeyToPath, PodSpec, PodTemplateSpec,
    SecretKeySelector as K8sSecretKeySelector, Volume, VolumeMount,
};
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{MariaDB, SqlJob};
use crate::mariadb::command::{
    ConnectionOpts, PASSWORD_ENV, USER_ENV, execute_sql_env, execute_sql_file,
};
use crate::resources::common::{FIELD_MANAGER, owner_reference, to_k8s_resources};

/// Label carrying the owning SqlJob name
pub const SQL_JOB_LABEL: &str = "database.mmontes.io/sqljob";

const SQL_ENV: &str = "SQL";
const SQL_VOLUME: &str = "sql";
const SQL_MOUNT_PATH: &str = "/var/sql-job";
const DEFAULT_SQL_KEY: &str = "job.sql";

/// Name of the Job dispatched for a run
///
/// One-shot jobs reuse the SqlJob name. Scheduled runs are suffixed with the
/// scheduled minute so a retried dispatch of the same run finds the same Job.
pub fn job_name(sql_job: &SqlJob, scheduled_at: Option<DateTime<Utc>>) -> String {
    let name = sql_job.name_any();
    match scheduled_at {
        Some(at) => format!("{}-{}", name, at.timestamp() / 60),
        None => name,
    }
}

/// Generate the Job running the SQL of `sql_job` against `mariadb`
pub fn generate_job(sql_job: &SqlJob, mariadb: &MariaDB, name: &str) -> Job {
    let spec = &sql_job.spec;
    let opts = ConnectionOpts {
        database: spec.database.as_deref(),
        ..Default::default()
    };

    let mut env = vec![
        EnvVar {
            name: USER_ENV.to_string(),
            value: Some(spec.username.clone()),
            ..Default::default()
        },
        EnvVar {
            name: PASSWORD_ENV.to_string(),
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(K8sSecretKeySelector {
                    name: spec.password_secret_key_ref.name.clone(),
                    key: spec.password_secret_key_ref.key.clone(),
                    optional: Some(false),
                }),
                ..Default::default()
            }),
            ..Default::default()
        },
    ];
    let mut volumes = Vec::new();
    let mut volume_mounts = Vec::new();

    // A ConfigMap source wins when both are set after an update
    let command = if let Some(selector) = &spec.sql_config_map_key_ref {
        let key = if selector.key.is_empty() {
            DEFAULT_SQL_KEY.to_string()
        } else {
            selector.key.clone()
        };
        volumes.push(Volume {
            name: SQL_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: selector.name.clone(),
                items: Some(vec![KeyToPath {
                    key,
                    path: DEFAULT_SQL_KEY.to_string(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: SQL_VOLUME.to_string(),
            mount_path: SQL_MOUNT_PATH.to_string(),
            read_only: Some(true),
            ..Default::default()
        });
        execute_sql_file(&opts, mariadb, &format!("{SQL_MOUNT_PATH}/{DEFAULT_SQL_KEY}"))
    } else {
        env.push(EnvVar {
            name: SQL_ENV.to_string(),
            value: spec.sql.clone(),
            ..Default::default()
        });
        execute_sql_env(&opts, mariadb, SQL_ENV)
    };

    let labels = BTreeMap::from([
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (SQL_JOB_LABEL.to_string(), sql_job.name_any()),
    ]);

    Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: sql_job.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(sql_job)]),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(spec.backoff_limit),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some(spec.restart_policy.clone()),
                    containers: vec![Container {
                        name: "sql".to_string(),
                        image: Some(mariadb.spec.image.reference()),
                        image_pull_policy: mariadb.spec.image.pull_policy.clone(),
                        command: Some(command.command),
                        args: Some(command.args),
                        env: Some(env),
                        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
                        resources: to_k8s_resources(spec.resources.as_ref()),
                        ..Default::default()
                    }],
                    volumes: (!volumes.is_empty()).then_some(volumes),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Outcome of a dispatched Job
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Running,
    Succeeded,
    Failed,
}

/// Read the outcome from Job status conditions
pub fn job_outcome(job: &Job) -> JobOutcome {
    let conditions = job
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref());
    let has = |type_: &str| {
        conditions.is_some_and(|cs| cs.iter().any(|c| c.type_ == type_ && c.status == "True"))
    };

    if has("Complete") {
        JobOutcome::Succeeded
    } else if has("Failed") {
        JobOutcome::Failed
    } else {
        JobOutcome::Running
    }
}
