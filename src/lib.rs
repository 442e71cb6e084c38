pub mod agent;
pub mod config;
pub mod controller;
pub mod crd;
pub mod cron;
pub mod health;
pub mod mariadb;
pub mod resources;
pub mod webhooks;

pub use config::{ConfigError, OperatorConfig};
pub use controller::{
    BackoffConfig, Context, Error, Result, error_policy, reconcile, reconcile_sql_job,
    sql_job_error_policy,
};
pub use crd::{MariaDB, SqlJob};
pub use health::{HealthState, Metrics};
pub use webhooks::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, run_webhook_server,
};

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::runtime::Controller;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

type ControllerResult<K> = std::result::Result<
    (ObjectRef<K>, Action),
    kube::runtime::controller::Error<Error, kube::runtime::watcher::Error>,
>;

/// Log the outcome of one reconciliation
async fn log_result<K>(kind: &'static str, result: ControllerResult<K>)
where
    K: Resource,
    K::DynamicType: Debug,
{
    match result {
        Ok((obj, _action)) => {
            tracing::debug!("Reconciled {}: {}", kind, obj.name);
        }
        Err(e) => {
            // NotFound is expected after deletion when a related watch event
            // triggers a reconcile for an object that no longer exists
            let is_not_found = matches!(
                &e,
                kube::runtime::controller::Error::ReconcilerFailed(err, _) if err.is_not_found()
            );
            if is_not_found {
                tracing::debug!("{} no longer exists (likely deleted): {:?}", kind, e);
            } else {
                tracing::error!("{} reconciliation error: {:?}", kind, e);
            }
        }
    }
}

/// Run the MariaDB controller with optional namespace scoping.
///
/// When `namespace` is `Some(ns)`, only watches resources in that namespace.
/// When `namespace` is `None`, watches resources cluster-wide.
pub async fn run_controller_scoped(client: Client, ctx: Arc<Context>, namespace: Option<&str>) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for MariaDB resources (scope: {})",
        scope_msg
    );

    let mariadbs: Api<MariaDB> = scoped_api(client.clone(), namespace);
    let statefulsets: Api<StatefulSet> = scoped_api(client.clone(), namespace);
    let services: Api<Service> = scoped_api(client.clone(), namespace);
    let configmaps: Api<ConfigMap> = scoped_api(client, namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    // Owned objects trigger a reconcile of their MariaDB
    Controller::new(mariadbs, watcher_config.clone())
        .owns(statefulsets, watcher_config.clone())
        .owns(services, watcher_config.clone())
        .owns(configmaps, watcher_config)
        .run(reconcile, error_policy, ctx)
        .for_each(|result| log_result("MariaDB", result))
        .await;

    // This should never complete in normal operation
    tracing::error!("MariaDB controller stream ended unexpectedly");
}

/// Run the SqlJob controller with optional namespace scoping.
pub async fn run_sql_job_controller_scoped(
    client: Client,
    ctx: Arc<Context>,
    namespace: Option<&str>,
) {
    let scope_msg = namespace.unwrap_or("cluster-wide");
    tracing::info!(
        "Starting controller for SqlJob resources (scope: {})",
        scope_msg
    );

    let sql_jobs: Api<SqlJob> = scoped_api(client.clone(), namespace);
    let jobs: Api<Job> = scoped_api(client, namespace);

    let watcher_config = WatcherConfig::default().any_semantic();

    Controller::new(sql_jobs, watcher_config.clone())
        .owns(jobs, watcher_config)
        .run(reconcile_sql_job, sql_job_error_policy, ctx)
        .for_each(|result| log_result("SqlJob", result))
        .await;

    tracing::error!("SqlJob controller stream ended unexpectedly");
}
