pub mod conditions;
pub mod context;
pub mod error;
pub mod galera;
pub mod reconciler;
pub mod sql_job_reconciler;
pub mod sql_job_scheduler;
pub mod store;
pub mod validation;

pub use conditions::ConditionTracker;
pub use context::{Clock, Context, ReconcileSettings, SystemClock};
pub use error::{BackoffConfig, Error, Result};
pub use galera::{ReplicationState, replication_state};
pub use reconciler::{PassOutcome, error_policy, reconcile, reconcile_pass};
pub use sql_job_reconciler::{SqlJobOutcome, reconcile_sql_job, sql_job_error_policy, sql_job_pass};
pub use sql_job_scheduler::{Dependency, RunDecision, WaitReason, decide};
pub use store::{ClusterStore, KubeStore, ResourceStore, SqlJobStore, SubResource, SubResourceKind};
pub use validation::{MAX_REPLICAS, MIN_REPLICAS, validate_spec, validate_spec_change};
