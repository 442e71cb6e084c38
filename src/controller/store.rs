//! Versioned object store used by the reconcilers
//!
//! The reconcilers never touch `kube::Api` directly. They go through these
//! traits so tests can run whole passes against in-memory fakes, and so every
//! write carries the `resourceVersion` it was computed from.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::crd::{MariaDB, MariaDBStatus, SqlJob, SqlJobStatus};
use crate::resources::common::FIELD_MANAGER;

/// Kind of object owned by a MariaDB
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubResourceKind {
    ConfigMap,
    Service,
    StatefulSet,
}

impl std::fmt::Display for SubResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubResourceKind::ConfigMap => write!(f, "ConfigMap"),
            SubResourceKind::Service => write!(f, "Service"),
            SubResourceKind::StatefulSet => write!(f, "StatefulSet"),
        }
    }
}

/// An object owned by a MariaDB, desired or live
#[derive(Clone, Debug, PartialEq)]
pub enum SubResource {
    ConfigMap(ConfigMap),
    Service(Service),
    StatefulSet(StatefulSet),
}

impl SubResource {
    pub fn kind(&self) -> SubResourceKind {
        match self {
            SubResource::ConfigMap(_) => SubResourceKind::ConfigMap,
            SubResource::Service(_) => SubResourceKind::Service,
            SubResource::StatefulSet(_) => SubResourceKind::StatefulSet,
        }
    }

    fn meta(&self) -> &kube::api::ObjectMeta {
        match self {
            SubResource::ConfigMap(o) => &o.metadata,
            SubResource::Service(o) => &o.metadata,
            SubResource::StatefulSet(o) => &o.metadata,
        }
    }

    fn meta_mut(&mut self) -> &mut kube::api::ObjectMeta {
        match self {
            SubResource::ConfigMap(o) => &mut o.metadata,
            SubResource::Service(o) => &mut o.metadata,
            SubResource::StatefulSet(o) => &mut o.metadata,
        }
    }

    pub fn name(&self) -> String {
        self.meta().name.clone().unwrap_or_default()
    }

    pub fn namespace(&self) -> String {
        self.meta()
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.meta().resource_version.as_deref()
    }

    /// Copy with `metadata.resourceVersion` set, used as a write precondition
    pub fn with_resource_version(mut self, resource_version: Option<String>) -> Self {
        self.meta_mut().resource_version = resource_version;
        self
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(match self {
            SubResource::ConfigMap(o) => serde_json::to_value(o)?,
            SubResource::Service(o) => serde_json::to_value(o)?,
            SubResource::StatefulSet(o) => serde_json::to_value(o)?,
        })
    }

    /// Ready replicas when this is a StatefulSet
    pub fn ready_replicas(&self) -> Option<i32> {
        match self {
            SubResource::StatefulSet(sts) => Some(
                sts.status
                    .as_ref()
                    .and_then(|s| s.ready_replicas)
                    .unwrap_or(0),
            ),
            _ => None,
        }
    }
}

/// Access to MariaDB objects
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<MariaDB>>;

    /// Replace the status, conditioned on the `resourceVersion` of `cluster`.
    /// Returns `Error::ConflictError` when the object changed since it was read.
    async fn patch_cluster_status(&self, cluster: &MariaDB, status: &MariaDBStatus) -> Result<()>;
}

/// Access to the objects owned by a MariaDB
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_resource(
        &self,
        kind: SubResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubResource>>;

    async fn create_resource(&self, resource: &SubResource) -> Result<()>;

    /// Server-side apply. When `resource` carries a `resourceVersion` the
    /// write is rejected with a conflict if the live object moved on.
    async fn apply_resource(&self, resource: &SubResource) -> Result<()>;
}

/// Access to SqlJobs and the batch Jobs they dispatch
#[async_trait]
pub trait SqlJobStore: Send + Sync {
    async fn get_sql_job(&self, namespace: &str, name: &str) -> Result<Option<SqlJob>>;

    /// Replace the status, conditioned on the `resourceVersion` of `sql_job`
    async fn patch_sql_job_status(&self, sql_job: &SqlJob, status: &SqlJobStatus) -> Result<()>;

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>>;

    async fn create_job(&self, job: &Job) -> Result<()>;
}

/// Store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Map a 409 from the API server to a conflict error
fn conflict_aware(err: kube::Error, what: &str) -> Error {
    match err {
        kube::Error::Api(ref api_err) if api_err.code == 409 => {
            Error::ConflictError(format!("{what}: {}", api_err.message))
        }
        other => Error::KubeError(other),
    }
}

fn status_patch<S: serde::Serialize>(resource_version: Option<String>, status: &S) -> serde_json::Value {
    // A resourceVersion inside a merge patch is checked by the API server
    serde_json::json!({
        "metadata": { "resourceVersion": resource_version },
        "status": status,
    })
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<MariaDB>> {
        let api: Api<MariaDB> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_cluster_status(&self, cluster: &MariaDB, status: &MariaDBStatus) -> Result<()> {
        let ns = cluster.namespace().unwrap_or_else(|| "default".to_string());
        let name = cluster.name_any();
        let api: Api<MariaDB> = Api::namespaced(self.client.clone(), &ns);

        let patch = status_patch(cluster.resource_version(), status);
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| conflict_aware(e, &format!("MariaDB {ns}/{name}")))?;
        debug!(namespace = %ns, name = %name, "Patched MariaDB status");
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_resource(
        &self,
        kind: SubResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubResource>> {
        let client = self.client.clone();
        Ok(match kind {
            SubResourceKind::ConfigMap => Api::<ConfigMap>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .map(SubResource::ConfigMap),
            SubResourceKind::Service => Api::<Service>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .map(SubResource::Service),
            SubResourceKind::StatefulSet => Api::<StatefulSet>::namespaced(client, namespace)
                .get_opt(name)
                .await?
                .map(SubResource::StatefulSet),
        })
    }

    async fn create_resource(&self, resource: &SubResource) -> Result<()> {
        let client = self.client.clone();
        let ns = resource.namespace();
        let pp = PostParams::default();
        let what = format!("{} {}/{}", resource.kind(), ns, resource.name());
        match resource {
            SubResource::ConfigMap(o) => Api::<ConfigMap>::namespaced(client, &ns)
                .create(&pp, o)
                .await
                .map(|_| ()),
            SubResource::Service(o) => Api::<Service>::namespaced(client, &ns)
                .create(&pp, o)
                .await
                .map(|_| ()),
            SubResource::StatefulSet(o) => Api::<StatefulSet>::namespaced(client, &ns)
                .create(&pp, o)
                .await
                .map(|_| ()),
        }
        .map_err(|e| conflict_aware(e, &what))?;
        debug!("Created {}", what);
        Ok(())
    }

    async fn apply_resource(&self, resource: &SubResource) -> Result<()> {
        let client = self.client.clone();
        let ns = resource.namespace();
        let name = resource.name();
        let params = PatchParams::apply(FIELD_MANAGER).force();
        let what = format!("{} {}/{}", resource.kind(), ns, name);
        match resource {
            SubResource::ConfigMap(o) => Api::<ConfigMap>::namespaced(client, &ns)
                .patch(&name, &params, &Patch::Apply(o))
                .await
                .map(|_| ()),
            SubResource::Service(o) => Api::<Service>::namespaced(client, &ns)
                .patch(&name, &params, &Patch::Apply(o))
                .await
                .map(|_| ()),
            SubResource::StatefulSet(o) => Api::<StatefulSet>::namespaced(client, &ns)
                .patch(&name, &params, &Patch::Apply(o))
                .await
                .map(|_| ()),
        }
        .map_err(|e| conflict_aware(e, &what))?;
        debug!("Applied {}", what);
        Ok(())
    }
}

#[async_trait]
impl SqlJobStore for KubeStore {
    async fn get_sql_job(&self, namespace: &str, name: &str) -> Result<Option<SqlJob>> {
        let api: Api<SqlJob> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn patch_sql_job_status(&self, sql_job: &SqlJob, status: &SqlJobStatus) -> Result<()> {
        let ns = sql_job.namespace().unwrap_or_else(|| "default".to_string());
        let name = sql_job.name_any();
        let api: Api<SqlJob> = Api::namespaced(self.client.clone(), &ns);

        let patch = status_patch(sql_job.resource_version(), status);
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| conflict_aware(e, &format!("SqlJob {ns}/{name}")))?;
        Ok(())
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn create_job(&self, job: &Job) -> Result<()> {
        let ns = job
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let api: Api<Job> = Api::namespaced(self.client.clone(), &ns);
        let what = format!("Job {}/{}", ns, job.name_any());
        api.create(&PostParams::default(), job)
            .await
            .map_err(|e| conflict_aware(e, &what))?;
        debug!("Created {}", what);
        Ok(())
    }
}
