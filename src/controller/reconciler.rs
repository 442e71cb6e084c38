//! Reconciliation logic for MariaDB resources
//!
//! One pass:
//! 1. fetch the MariaDB; stop when it is gone, being deleted or suspended
//! 2. run Galera recovery first when the replication group regressed
//! 3. converge the ConfigMap, Services and StatefulSet, in that order
//! 4. re-evaluate `GaleraReady` and `Ready` and mirror ready replicas
//! 5. patch status only if it changed, conditioned on the version read in 1
//!
//! A status conflict restarts the pass from a fresh read.

use std::sync::Arc;
use std::time::Instant;

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::agent;
use crate::controller::conditions::{ConditionTracker, condition_reasons, condition_types};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::galera::{self, ReplicationState};
use crate::controller::store::SubResourceKind;
use crate::crd::{MariaDB, MariaDBStatus};
use crate::health::ControllerKind;
use crate::resources::{desired_resources, reconcile_resource};

/// Passes restarted after a status conflict before giving up
pub const MAX_STATUS_ATTEMPTS: u32 = 3;

/// How a pass ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PassOutcome {
    /// The MariaDB no longer exists
    Gone,
    /// Deletion in progress or reconciliation suspended, nothing written
    Paused,
    /// A member agent could not be reached, nothing written
    Deferred(String),
    Completed {
        /// Whether a status patch was sent
        status_changed: bool,
        /// Ready condition after the pass
        ready: bool,
    },
}

enum PassStep {
    Done(PassOutcome),
    StatusConflict,
}

/// Main reconciliation function
#[instrument(skip(mariadb, ctx), fields(name = %mariadb.name_any(), namespace = mariadb.namespace().unwrap_or_default()))]
pub async fn reconcile(mariadb: Arc<MariaDB>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = mariadb
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = mariadb.name_any();

    debug!("Reconciling MariaDB");

    let deadline = ctx.settings.pass_timeout;
    let outcome = timeout(deadline, reconcile_pass(&ctx, &ns, &name))
        .await
        .map_err(|_| Error::TimeoutError(deadline))??;

    ctx.reset_failures(&object_key(&ns, &name));
    if let Some(ref health) = ctx.health_state {
        health
            .metrics
            .record_reconcile(ControllerKind::MariaDB, &ns, &name, start.elapsed().as_secs_f64());
    }

    Ok(match outcome {
        PassOutcome::Gone | PassOutcome::Paused => Action::await_change(),
        PassOutcome::Deferred(reason) => {
            info!(%reason, "Galera step deferred");
            Action::requeue(ctx.settings.pending_requeue_interval)
        }
        PassOutcome::Completed { ready: true, .. } => Action::requeue(ctx.settings.requeue_interval),
        PassOutcome::Completed { ready: false, .. } => {
            Action::requeue(ctx.settings.pending_requeue_interval)
        }
    })
}

/// Error policy for the controller with exponential backoff
pub fn error_policy(mariadb: Arc<MariaDB>, error: &Error, ctx: Arc<Context>) -> Action {
    let ns = mariadb.namespace().unwrap_or_default();
    let name = mariadb.name_any();
    let attempt = ctx.record_failure(&object_key(&ns, &name));
    let delay = ctx.backoff.delay_for_error(error, attempt);

    if let Some(ref health) = ctx.health_state {
        health
            .metrics
            .record_error(ControllerKind::MariaDB, &ns, &name, error.metric_label());
    }

    if error.is_retryable() {
        warn!(
            "Retryable error for {}: {}, attempt {}, requeuing in {:?}",
            name, error, attempt, delay
        );
    } else {
        error!(
            "Non-retryable error for {}: {}, requeuing in {:?} for manual intervention",
            name, error, delay
        );
    }

    Action::requeue(delay)
}

pub(crate) fn object_key(ns: &str, name: &str) -> String {
    format!("{ns}/{name}")
}

/// Run one pass, restarting from a fresh read after a status conflict
pub async fn reconcile_pass(ctx: &Context, ns: &str, name: &str) -> Result<PassOutcome> {
    for attempt in 1..=MAX_STATUS_ATTEMPTS {
        match run_pass(ctx, ns, name).await? {
            PassStep::Done(outcome) => return Ok(outcome),
            PassStep::StatusConflict => {
                debug!(attempt, "Status conflict, restarting pass");
            }
        }
    }
    Err(Error::ConflictError(format!(
        "MariaDB {ns}/{name} status kept changing after {MAX_STATUS_ATTEMPTS} attempts"
    )))
}

async fn run_pass(ctx: &Context, ns: &str, name: &str) -> Result<PassStep> {
    let Some(mariadb) = ctx.clusters.get_cluster(ns, name).await? else {
        debug!("MariaDB not found");
        return Ok(PassStep::Done(PassOutcome::Gone));
    };

    if mariadb.metadata.deletion_timestamp.is_some() {
        debug!("MariaDB is being deleted");
        return Ok(PassStep::Done(PassOutcome::Paused));
    }
    if mariadb.spec.suspend {
        debug!("MariaDB reconciliation is suspended");
        return Ok(PassStep::Done(PassOutcome::Paused));
    }

    let current = mariadb.status_or_default();
    let generation = mariadb.metadata.generation;
    let mut conditions = ConditionTracker::at(current.conditions.clone(), generation, ctx.clock.now());

    let galera_active = galera::is_active(&mariadb, &conditions);
    let members = agent::members(&mariadb);

    if galera_active && galera::replication_state(&mariadb, &conditions) == ReplicationState::Recovering {
        match galera::recover(ctx.agent.as_ref(), &members).await {
            Ok(Some(plan)) => {
                info!(source = %plan.source.name, seqno = plan.position.seqno, "Galera recovery instructed");
                if let Some(ref health) = ctx.health_state {
                    health.metrics.record_galera_recovery(ns, name);
                }
            }
            Ok(None) => debug!("No Galera members to recover"),
            Err(e) => return Ok(PassStep::Done(PassOutcome::Deferred(e.to_string()))),
        }
    }

    for desired in desired_resources(&mariadb) {
        reconcile_resource(ctx.resources.as_ref(), &desired).await?;
    }

    let ready_replicas = ctx
        .resources
        .get_resource(SubResourceKind::StatefulSet, ns, name)
        .await?
        .and_then(|sts| sts.ready_replicas())
        .unwrap_or(0);

    if galera_active
        && let Err(e) = galera::evaluate_readiness(
            ctx.agent.as_ref(),
            &mariadb,
            &members,
            &mut conditions,
            ready_replicas,
        )
        .await
    {
        return Ok(PassStep::Done(PassOutcome::Deferred(e.to_string())));
    }

    if !conditions.is_true(condition_types::RESTORING_BACKUP) {
        set_ready_condition(&mariadb, &mut conditions, ready_replicas);
    }

    let ready = conditions.is_true(condition_types::READY);
    let status = MariaDBStatus {
        conditions: conditions.into_conditions(),
        ready_replicas,
        observed_generation: generation,
    };

    if let Some(ref health) = ctx.health_state {
        health.metrics.set_cluster_replicas(
            ns,
            name,
            i64::from(mariadb.spec.replicas),
            i64::from(ready_replicas),
        );
    }

    if status == current {
        return Ok(PassStep::Done(PassOutcome::Completed {
            status_changed: false,
            ready,
        }));
    }

    match ctx.clusters.patch_cluster_status(&mariadb, &status).await {
        Ok(()) => Ok(PassStep::Done(PassOutcome::Completed {
            status_changed: true,
            ready,
        })),
        Err(e) if e.is_conflict() => Ok(PassStep::StatusConflict),
        Err(e) => Err(e),
    }
}

fn set_ready_condition(mariadb: &MariaDB, conditions: &mut ConditionTracker, ready_replicas: i32) {
    let desired = mariadb.spec.replicas;
    let galera_pending =
        mariadb.spec.galera.is_some() && !conditions.is_true(condition_types::GALERA_READY);

    if ready_replicas != desired {
        conditions.set_false(
            condition_types::READY,
            condition_reasons::STATEFULSET_NOT_READY,
            &format!("{ready_replicas}/{desired} replicas ready"),
        );
    } else if galera_pending {
        conditions.set_false(
            condition_types::READY,
            condition_reasons::GALERA_NOT_READY,
            "Galera cluster is not ready",
        );
    } else {
        conditions.set_true(
            condition_types::READY,
            condition_reasons::STATEFULSET_READY,
            "All replicas are ready",
        );
    }
}
