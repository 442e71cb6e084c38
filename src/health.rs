//! Health server for Kubernetes probes and Prometheus metrics
//!
//! - `/healthz` liveness, always 200 once the server is up
//! - `/readyz` readiness, 200 after the controllers have started
//! - `/metrics` Prometheus text exposition

use std::fmt::Write;
use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue, LabelValueEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

const METRIC_PREFIX: &str = "mariadb_operator";

/// Which control loop a sample belongs to
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ControllerKind {
    MariaDB,
    SqlJob,
}

impl ControllerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerKind::MariaDB => "mariadb",
            ControllerKind::SqlJob => "sqljob",
        }
    }
}

impl EncodeLabelValue for ControllerKind {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        encoder.write_str(self.as_str())
    }
}

/// Result of a finished SqlJob run
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RunResult {
    Succeeded,
    Failed,
}

impl RunResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunResult::Succeeded => "succeeded",
            RunResult::Failed => "failed",
        }
    }
}

impl EncodeLabelValue for RunResult {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), std::fmt::Error> {
        encoder.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ObjectLabels {
    pub controller: ControllerKind,
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: ControllerKind,
    pub namespace: String,
    pub name: String,
    /// `controller::Error::metric_label`
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RunLabels {
    pub namespace: String,
    pub name: String,
    pub result: RunResult,
}

/// Operator metrics and the registry they are exposed from
pub struct Metrics {
    pub reconciliations: Family<ObjectLabels, Counter>,
    pub reconciliation_errors: Family<ErrorLabels, Counter>,
    pub reconcile_duration_seconds: Family<ObjectLabels, Histogram>,
    pub galera_recoveries: Family<ClusterLabels, Counter>,
    pub sql_job_runs: Family<RunLabels, Counter>,
    pub cluster_replicas_desired: Family<ClusterLabels, Gauge>,
    pub cluster_replicas_ready: Family<ClusterLabels, Gauge>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix(METRIC_PREFIX);

        let reconciliations = Family::<ObjectLabels, Counter>::default();
        registry.register(
            "reconciliations",
            "Completed reconcile passes",
            reconciliations.clone(),
        );

        let reconciliation_errors = Family::<ErrorLabels, Counter>::default();
        registry.register(
            "reconciliation_errors",
            "Failed reconcile passes by error kind",
            reconciliation_errors.clone(),
        );

        let reconcile_duration_seconds =
            Family::<ObjectLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "reconcile_duration_seconds",
            "Duration of successful reconcile passes",
            reconcile_duration_seconds.clone(),
        );

        let galera_recoveries = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "galera_recoveries",
            "Galera recovery sequences that bootstrapped a member",
            galera_recoveries.clone(),
        );

        let sql_job_runs = Family::<RunLabels, Counter>::default();
        registry.register(
            "sql_job_runs",
            "Finished SqlJob runs by result",
            sql_job_runs.clone(),
        );

        let cluster_replicas_desired = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cluster_replicas_desired",
            "Desired replicas of each MariaDB",
            cluster_replicas_desired.clone(),
        );

        let cluster_replicas_ready = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "cluster_replicas_ready",
            "Ready replicas of each MariaDB",
            cluster_replicas_ready.clone(),
        );

        Self {
            reconciliations,
            reconciliation_errors,
            reconcile_duration_seconds,
            galera_recoveries,
            sql_job_runs,
            cluster_replicas_desired,
            cluster_replicas_ready,
            registry,
        }
    }

    pub fn record_reconcile(
        &self,
        controller: ControllerKind,
        namespace: &str,
        name: &str,
        duration_secs: f64,
    ) {
        let labels = ObjectLabels {
            controller,
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.reconciliations.get_or_create(&labels).inc();
        self.reconcile_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    pub fn record_error(&self, controller: ControllerKind, namespace: &str, name: &str, kind: &str) {
        self.reconciliation_errors
            .get_or_create(&ErrorLabels {
                controller,
                namespace: namespace.to_string(),
                name: name.to_string(),
                kind: kind.to_string(),
            })
            .inc();
    }

    pub fn record_galera_recovery(&self, namespace: &str, name: &str) {
        self.galera_recoveries
            .get_or_create(&cluster_labels(namespace, name))
            .inc();
    }

    pub fn record_sql_job_run(&self, namespace: &str, name: &str, result: RunResult) {
        self.sql_job_runs
            .get_or_create(&RunLabels {
                namespace: namespace.to_string(),
                name: name.to_string(),
                result,
            })
            .inc();
    }

    pub fn set_cluster_replicas(&self, namespace: &str, name: &str, desired: i64, ready: i64) {
        let labels = cluster_labels(namespace, name);
        self.cluster_replicas_desired
            .get_or_create(&labels)
            .set(desired);
        self.cluster_replicas_ready.get_or_create(&labels).set(ready);
    }

    /// Prometheus text exposition of every registered metric
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

fn cluster_labels(namespace: &str, name: &str) -> ClusterLabels {
    ClusterLabels {
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

/// Shared state for the health server
pub struct HealthState {
    pub ready: RwLock<bool>,
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.encode(),
    )
}

pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve probes and metrics on 0.0.0.0:`port` until the process exits
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!("Health server listening on 0.0.0.0:{}", port);

    axum::serve(listener, create_router(state)).await
}
