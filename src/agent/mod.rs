//! Galera member agent protocol
//!
//! Every MariaDB pod in a Galera cluster runs an agent sidecar that exposes
//! the node's replication position and accepts bootstrap instructions:
//!
//! | Method | Path | Body | Response |
//! |---|---|---|---|
//! | GET | `/api/galera/state` | | `{uuid, seqno, safeToBootstrap}` |
//! | POST | `/api/recovery` | | `{uuid, seqno, safeToBootstrap}` |
//! | PUT | `/api/bootstrap` | `{uuid, seqno}` | |
//! | PUT | `/api/join` | `{host}` | |
//! | DELETE | `/api/bootstrap` | | |
//!
//! Any non-2xx response is a failure.

mod http;

use async_trait::async_trait;
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crd::MariaDB;

pub use http::HttpAgentClient;

/// Errors talking to a member agent. All of them are transient.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("connection to {member} failed: {message}")]
    Connection { member: String, message: String },

    #[error("HTTP error from {member}: {message}")]
    Http { member: String, message: String },

    #[error("{member} returned HTTP {status}")]
    Status { member: String, status: u16 },

    #[error("invalid response from {member}: {source}")]
    Json {
        member: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request to {0} timed out")]
    Timeout(String),
}

/// One Galera member addressed through the headless Service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GaleraMember {
    /// Pod name
    pub name: String,
    /// Stable DNS name of the pod
    pub host: String,
    /// Agent port
    pub port: u16,
    /// StatefulSet ordinal
    pub ordinal: i32,
}

/// Replication position reported by a member (grastate.dat)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryState {
    pub uuid: String,
    /// -1 after an unclean shutdown until recovery has run
    pub seqno: i64,
    #[serde(default)]
    pub safe_to_bootstrap: bool,
}

impl RecoveryState {
    /// Whether the reported position is usable for source selection
    pub fn is_known(&self) -> bool {
        self.seqno >= 0
    }
}

/// Body of `PUT /api/bootstrap`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapRequest {
    pub uuid: String,
    pub seqno: i64,
}

/// Body of `PUT /api/join`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub host: String,
}

/// Client for the member agent protocol
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Current grastate of the member
    async fn galera_state(&self, member: &GaleraMember) -> Result<RecoveryState, AgentError>;

    /// Run wsrep recovery on the member and return the recovered position
    async fn recover(&self, member: &GaleraMember) -> Result<RecoveryState, AgentError>;

    /// Start the member as the bootstrap node of a new replication group
    async fn start_bootstrap(
        &self,
        member: &GaleraMember,
        request: &BootstrapRequest,
    ) -> Result<(), AgentError>;

    /// Make the member join the group through `request.host`
    async fn join(&self, member: &GaleraMember, request: &JoinRequest) -> Result<(), AgentError>;

    /// Clear any bootstrap flag left on the member
    async fn disable_bootstrap(&self, member: &GaleraMember) -> Result<(), AgentError>;
}

/// Members of a MariaDB Galera cluster, ordered by ordinal
pub fn members(mariadb: &MariaDB) -> Vec<GaleraMember> {
    let name = mariadb.name_any();
    let namespace = mariadb.namespace().unwrap_or_else(|| "default".to_string());
    let internal = mariadb.internal_service_name();
    let port = mariadb
        .spec
        .galera
        .as_ref()
        .map(|g| g.agent.port)
        .unwrap_or_default()
        .clamp(0, u16::MAX as i32) as u16;

    (0..mariadb.spec.replicas.max(0))
        .map(|ordinal| {
            let pod = format!("{name}-{ordinal}");
            GaleraMember {
                host: format!("{pod}.{internal}.{namespace}.svc.cluster.local"),
                name: pod,
                port,
                ordinal,
            }
        })
        .collect()
}
