//! Reconciliation logic for SqlJob resources
//!
//! A pass first settles the Job dispatched by a previous pass, then asks the
//! scheduler whether a new run is due and dispatches it as a batch/v1 Job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::ResourceExt;
use kube::runtime::controller::Action;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::conditions::{ConditionTracker, condition_reasons, condition_types};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::reconciler::object_key;
use crate::controller::sql_job_scheduler::{Dependency, RunDecision, WaitReason, decide};
use crate::crd::{SqlJob, SqlJobStatus};
use crate::health::{ControllerKind, RunResult};
use crate::resources::{JobOutcome, generate_job, job_name, job_outcome};

/// How a SqlJob pass ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SqlJobOutcome {
    Gone,
    /// The dispatched Job is still running
    Running { job: String },
    Dispatched { job: String },
    Waiting {
        reason: WaitReason,
        retry_after: Option<Duration>,
    },
    /// One-shot job finished
    Done,
}

/// Main reconciliation function for SqlJobs
#[instrument(skip(sql_job, ctx), fields(name = %sql_job.name_any(), namespace = sql_job.namespace().unwrap_or_default()))]
pub async fn reconcile_sql_job(sql_job: Arc<SqlJob>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let ns = sql_job
        .namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))?;
    let name = sql_job.name_any();

    let deadline = ctx.settings.pass_timeout;
    let outcome = timeout(deadline, sql_job_pass(&ctx, &ns, &name))
        .await
        .map_err(|_| Error::TimeoutError(deadline))??;

    ctx.reset_failures(&sql_job_key(&ns, &name));
    if let Some(ref health) = ctx.health_state {
        health
            .metrics
            .record_reconcile(ControllerKind::SqlJob, &ns, &name, start.elapsed().as_secs_f64());
    }

    Ok(match outcome {
        SqlJobOutcome::Gone | SqlJobOutcome::Done => Action::await_change(),
        SqlJobOutcome::Running { .. } | SqlJobOutcome::Dispatched { .. } => {
            Action::requeue(ctx.settings.pending_requeue_interval)
        }
        SqlJobOutcome::Waiting {
            reason,
            retry_after,
        } => {
            debug!(%reason, "SqlJob waiting");
            match retry_after {
                Some(after) => Action::requeue(after.min(ctx.settings.requeue_interval)),
                None => Action::await_change(),
            }
        }
    })
}

/// Error policy for the SqlJob controller
pub fn sql_job_error_policy(sql_job: Arc<SqlJob>, error: &Error, ctx: Arc<Context>) -> Action {
    let ns = sql_job.namespace().unwrap_or_default();
    let name = sql_job.name_any();
    let attempt = ctx.record_failure(&sql_job_key(&ns, &name));
    let delay = ctx.backoff.delay_for_error(error, attempt);

    if let Some(ref health) = ctx.health_state {
        health
            .metrics
            .record_error(ControllerKind::SqlJob, &ns, &name, error.metric_label());
    }

    if error.is_retryable() {
        warn!("Retryable error for SqlJob {}: {}, requeuing in {:?}", name, error, delay);
    } else {
        error!("Non-retryable error for SqlJob {}: {}, requeuing in {:?}", name, error, delay);
    }

    Action::requeue(delay)
}

fn sql_job_key(ns: &str, name: &str) -> String {
    format!("sqljob:{}", object_key(ns, name))
}

/// Run one SqlJob pass
pub async fn sql_job_pass(ctx: &Context, ns: &str, name: &str) -> Result<SqlJobOutcome> {
    let Some(sql_job) = ctx.sql_jobs.get_sql_job(ns, name).await? else {
        return Ok(SqlJobOutcome::Gone);
    };
    if sql_job.metadata.deletion_timestamp.is_some() {
        return Ok(SqlJobOutcome::Gone);
    }

    let now = ctx.clock.now();
    let current = sql_job.status_or_default();
    let mut status = current.clone();
    let mut conditions =
        ConditionTracker::at(current.conditions.clone(), sql_job.metadata.generation, now);

    if let Some(active) = current.active_job.as_deref() {
        match ctx.sql_jobs.get_job(ns, active).await? {
            None => {
                warn!(job = active, "Dispatched Job disappeared");
                status.active_job = None;
            }
            Some(job) => match job_outcome(&job) {
                JobOutcome::Running => {
                    return Ok(SqlJobOutcome::Running {
                        job: active.to_string(),
                    });
                }
                JobOutcome::Succeeded => {
                    info!(job = active, "SqlJob run succeeded");
                    status.active_job = None;
                    status.last_success_time = Some(now.to_rfc3339());
                    conditions.set_true(
                        condition_types::COMPLETE,
                        condition_reasons::JOB_COMPLETE,
                        "Success",
                    );
                    if let Some(ref health) = ctx.health_state {
                        health.metrics.record_sql_job_run(ns, name, RunResult::Succeeded);
                    }
                }
                JobOutcome::Failed => {
                    warn!(job = active, "SqlJob run failed");
                    status.active_job = None;
                    conditions.set_false(
                        condition_types::COMPLETE,
                        condition_reasons::JOB_FAILED,
                        "Failed",
                    );
                    if let Some(ref health) = ctx.health_state {
                        health.metrics.record_sql_job_run(ns, name, RunResult::Failed);
                    }
                }
            },
        }
    }

    let cluster_name = &sql_job.spec.maria_db_ref.name;
    let cluster = ctx.clusters.get_cluster(ns, cluster_name).await?;

    let mut dependencies = Vec::with_capacity(sql_job.spec.depends_on.len());
    for dep in &sql_job.spec.depends_on {
        dependencies.push(Dependency {
            name: dep.name.clone(),
            job: ctx.sql_jobs.get_sql_job(ns, &dep.name).await?,
        });
    }

    let outcome = match decide(&sql_job, cluster.as_ref(), &dependencies, now)? {
        RunDecision::Done => SqlJobOutcome::Done,
        RunDecision::Wait {
            reason,
            retry_after,
        } => SqlJobOutcome::Waiting {
            reason,
            retry_after,
        },
        RunDecision::Run { scheduled_at } => {
            let mariadb = cluster.ok_or_else(|| Error::NotFound(cluster_name.clone()))?;
            let job = job_name(&sql_job, scheduled_at);

            if ctx.sql_jobs.get_job(ns, &job).await?.is_none() {
                match ctx
                    .sql_jobs
                    .create_job(&generate_job(&sql_job, &mariadb, &job))
                    .await
                {
                    Ok(()) => info!(job = %job, "Dispatched SqlJob run"),
                    // Created by an earlier pass whose status write was lost
                    Err(e) if e.is_conflict() => debug!(job = %job, "Job already exists"),
                    Err(e) => return Err(e),
                }
            }

            status.last_schedule_time = Some(scheduled_at.unwrap_or(now).to_rfc3339());
            status.active_job = Some(job.clone());
            conditions.set_false(
                condition_types::COMPLETE,
                condition_reasons::JOB_RUNNING,
                "Running",
            );
            SqlJobOutcome::Dispatched { job }
        }
    };

    let status = SqlJobStatus {
        conditions: conditions.into_conditions(),
        ..status
    };
    if status != current {
        ctx.sql_jobs.patch_sql_job_status(&sql_job, &status).await?;
    }

    Ok(outcome)
}
