//! When a SqlJob may run
//!
//! Gates are checked in order: schedule, cluster readiness, dependencies.
//! The decision is a pure function of the observed objects and the clock.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cron::{CronError, CronSchedule};
use crate::crd::{MariaDB, SqlJob};

/// Retry interval while waiting on the cluster or a dependency
pub const GATE_RETRY: Duration = Duration::from_secs(10);

/// Scheduling decision for one SqlJob
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunDecision {
    /// Dispatch now. `scheduled_at` is the cron slot being served.
    Run { scheduled_at: Option<DateTime<Utc>> },
    /// Check again after `retry_after`, or when something changes when None
    Wait {
        reason: WaitReason,
        retry_after: Option<Duration>,
    },
    /// A one-shot job that already ran
    Done,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitReason {
    Suspended,
    NotDue { next: DateTime<Utc> },
    /// The cron expression never matches within the search horizon
    NoUpcomingRun,
    ClusterNotFound(String),
    ClusterNotReady(String),
    DependencyNotFound(String),
    DependencyNotSucceeded(String),
}

impl std::fmt::Display for WaitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WaitReason::Suspended => write!(f, "schedule is suspended"),
            WaitReason::NotDue { next } => write!(f, "next run at {}", next.to_rfc3339()),
            WaitReason::NoUpcomingRun => write!(f, "schedule has no upcoming run"),
            WaitReason::ClusterNotFound(name) => write!(f, "MariaDB {name} not found"),
            WaitReason::ClusterNotReady(name) => write!(f, "MariaDB {name} is not ready"),
            WaitReason::DependencyNotFound(name) => write!(f, "dependency {name} not found"),
            WaitReason::DependencyNotSucceeded(name) => {
                write!(f, "dependency {name} has not succeeded yet")
            }
        }
    }
}

/// Observed state of a dependency
#[derive(Clone, Debug)]
pub struct Dependency {
    pub name: String,
    pub job: Option<SqlJob>,
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Object metadata timestamps are `jiff` values
fn from_timestamp(ts: &jiff::Timestamp) -> Option<DateTime<Utc>> {
    let nanos = u32::try_from(ts.subsec_nanosecond()).unwrap_or(0);
    DateTime::from_timestamp(ts.as_second(), nanos)
}

/// Next cron slot strictly after the last dispatch, or after creation
pub fn next_run(sql_job: &SqlJob, cron: &CronSchedule) -> Option<DateTime<Utc>> {
    let last = sql_job
        .status
        .as_ref()
        .and_then(|s| s.last_schedule_time.as_deref())
        .and_then(parse_time)
        .or_else(|| {
            sql_job
                .metadata
                .creation_timestamp
                .as_ref()
                .and_then(|t| from_timestamp(&t.0))
        })?;
    cron.next_after(last)
}

/// Most recent slot at or before `now`, starting from the due slot `first`
///
/// Slots missed while the operator was down collapse into a single run.
fn latest_due_slot(cron: &CronSchedule, first: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    const MAX_MISSED: usize = 1000;
    let mut slot = first;
    for _ in 0..MAX_MISSED {
        match cron.next_after(slot) {
            Some(next) if next <= now => slot = next,
            _ => break,
        }
    }
    slot
}

/// Decide whether `sql_job` runs now
///
/// `cluster` is the referenced MariaDB if it exists, `dependencies` the
/// lookup result for every `dependsOn` entry.
pub fn decide(
    sql_job: &SqlJob,
    cluster: Option<&MariaDB>,
    dependencies: &[Dependency],
    now: DateTime<Utc>,
) -> Result<RunDecision, CronError> {
    let status = sql_job.status.as_ref();

    let scheduled_at = match &sql_job.spec.schedule {
        None => {
            if status.is_some_and(|s| s.last_schedule_time.is_some()) {
                return Ok(RunDecision::Done);
            }
            None
        }
        Some(schedule) => {
            if schedule.suspend {
                return Ok(wait(WaitReason::Suspended, None));
            }
            let cron = CronSchedule::parse(&schedule.cron)?;
            let Some(next) = next_run(sql_job, &cron) else {
                return Ok(wait(WaitReason::NoUpcomingRun, None));
            };
            if now < next {
                let until = (next - now).to_std().unwrap_or(Duration::ZERO);
                return Ok(wait(WaitReason::NotDue { next }, Some(until)));
            }
            Some(latest_due_slot(&cron, next, now))
        }
    };

    let cluster_name = &sql_job.spec.maria_db_ref.name;
    match cluster {
        None => {
            return Ok(wait(
                WaitReason::ClusterNotFound(cluster_name.clone()),
                Some(GATE_RETRY),
            ));
        }
        Some(mariadb) if !mariadb.is_ready() => {
            return Ok(wait(
                WaitReason::ClusterNotReady(cluster_name.clone()),
                Some(GATE_RETRY),
            ));
        }
        Some(_) => {}
    }

    if let Some(reason) = dependency_gate(dependencies) {
        return Ok(wait(reason, Some(GATE_RETRY)));
    }

    Ok(RunDecision::Run { scheduled_at })
}

/// First unmet dependency, if any
pub fn dependency_gate(dependencies: &[Dependency]) -> Option<WaitReason> {
    dependencies.iter().find_map(|dep| match &dep.job {
        None => Some(WaitReason::DependencyNotFound(dep.name.clone())),
        Some(job) if !job.has_succeeded() => {
            Some(WaitReason::DependencyNotSucceeded(dep.name.clone()))
        }
        Some(_) => None,
    })
}

fn wait(reason: WaitReason, retry_after: Option<Duration>) -> RunDecision {
    RunDecision::Wait {
        reason,
        retry_after,
    }
}
