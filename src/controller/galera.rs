//! Galera replication group coordination
//!
//! The replication group state is derived from the `GaleraReady` condition on
//! every pass and never stored:
//!
//! ```text
//!   (absent) ──> Bootstrapping ──ready == desired, bootstrap disabled──> Ready
//!                                                                         │
//!         Recovering <──────────────── ready * 2 <= desired ──────────────┘
//!             │
//!             └──poll agents, bootstrap highest seqno, join the rest──> Ready
//! ```
//!
//! A restore in progress always takes precedence and suspends every step here.

use std::cmp::Reverse;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::agent::{
    AgentClient, AgentError, BootstrapRequest, GaleraMember, JoinRequest, RecoveryState,
};
use crate::controller::conditions::{ConditionTracker, condition_reasons, condition_types};
use crate::crd::{ConditionStatus, MariaDB};

/// Replication group state derived from status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicationState {
    /// No Galera configuration
    Disabled,
    /// The group has never been ready
    Bootstrapping,
    /// A previously healthy group lost quorum
    Recovering,
    Ready,
}

impl std::fmt::Display for ReplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationState::Disabled => write!(f, "Disabled"),
            ReplicationState::Bootstrapping => write!(f, "Bootstrapping"),
            ReplicationState::Recovering => write!(f, "Recovering"),
            ReplicationState::Ready => write!(f, "Ready"),
        }
    }
}

/// Derive the replication state from the spec and the tracked conditions
pub fn replication_state(mariadb: &MariaDB, conditions: &ConditionTracker) -> ReplicationState {
    if mariadb.spec.galera.is_none() {
        return ReplicationState::Disabled;
    }
    match conditions.get(condition_types::GALERA_READY) {
        None => ReplicationState::Bootstrapping,
        Some(c) if c.status == ConditionStatus::True => ReplicationState::Ready,
        Some(c) if c.reason == condition_reasons::BOOTSTRAPPING => ReplicationState::Bootstrapping,
        Some(_) => ReplicationState::Recovering,
    }
}

/// Whether Galera steps run this pass
pub fn is_active(mariadb: &MariaDB, conditions: &ConditionTracker) -> bool {
    mariadb.spec.galera.is_some()
        && !conditions.is_true(condition_types::RESTORING_BACKUP)
}

/// Bootstrap decision taken by a recovery sequence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveryPlan {
    pub source: GaleraMember,
    pub position: RecoveryState,
    pub joiners: Vec<GaleraMember>,
}

/// Pick the member to bootstrap from
///
/// Highest seqno wins. Ties go to a member flagged safe to bootstrap, then to
/// the lowest ordinal.
pub fn select_bootstrap_source(reports: &[(GaleraMember, RecoveryState)]) -> Option<usize> {
    reports
        .iter()
        .enumerate()
        .max_by_key(|(_, (member, state))| {
            (state.seqno, state.safe_to_bootstrap, Reverse(member.ordinal))
        })
        .map(|(idx, _)| idx)
}

/// Ask a member for its position, running wsrep recovery when the
/// grastate does not carry one
async fn poll_member(
    agent: &dyn AgentClient,
    member: &GaleraMember,
) -> Result<RecoveryState, AgentError> {
    let state = agent.galera_state(member).await?;
    if state.is_known() {
        return Ok(state);
    }
    debug!(member = %member.name, "Position unknown, running recovery");
    agent.recover(member).await
}

/// Run the recovery sequence against `members`
///
/// Polls every member concurrently, bootstraps the most advanced one and
/// makes the others join it. Returns None when there are no members.
pub async fn recover(
    agent: &dyn AgentClient,
    members: &[GaleraMember],
) -> Result<Option<RecoveryPlan>, AgentError> {
    let polled = join_all(members.iter().map(|m| poll_member(agent, m))).await;

    let mut reports = Vec::with_capacity(members.len());
    for (member, result) in members.iter().zip(polled) {
        reports.push((member.clone(), result?));
    }

    let Some(source_idx) = select_bootstrap_source(&reports) else {
        return Ok(None);
    };
    let (source, position) = reports.swap_remove(source_idx);
    let mut joiners: Vec<GaleraMember> = reports.into_iter().map(|(m, _)| m).collect();
    joiners.sort_by_key(|m| m.ordinal);

    info!(
        source = %source.name,
        uuid = %position.uuid,
        seqno = position.seqno,
        "Bootstrapping Galera cluster"
    );
    agent
        .start_bootstrap(
            &source,
            &BootstrapRequest {
                uuid: position.uuid.clone(),
                seqno: position.seqno,
            },
        )
        .await?;

    let join = JoinRequest {
        host: source.host.clone(),
    };
    let joined = join_all(joiners.iter().map(|m| agent.join(m, &join))).await;
    for result in joined {
        result?;
    }

    Ok(Some(RecoveryPlan {
        source,
        position,
        joiners,
    }))
}

/// Clear the bootstrap flag on every member, failing unless all succeed
pub async fn disable_bootstrap(
    agent: &dyn AgentClient,
    members: &[GaleraMember],
) -> Result<(), AgentError> {
    let results = join_all(members.iter().map(|m| agent.disable_bootstrap(m))).await;
    let mut first_error = None;
    for (member, result) in members.iter().zip(results) {
        if let Err(e) = result {
            warn!(member = %member.name, error = %e, "Failed to disable bootstrap");
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Update `GaleraReady` from the StatefulSet's ready replica count
///
/// - absent: initialised to False/Bootstrapping
/// - True with a minority of ready members: False/QuorumLost
/// - not True with every member ready: bootstrap is disabled on every member,
///   then True. A failed broadcast leaves the condition untouched.
pub async fn evaluate_readiness(
    agent: &dyn AgentClient,
    mariadb: &MariaDB,
    members: &[GaleraMember],
    conditions: &mut ConditionTracker,
    ready_replicas: i32,
) -> Result<(), AgentError> {
    let desired = mariadb.spec.replicas;

    if conditions.get(condition_types::GALERA_READY).is_none() {
        conditions.set_false(
            condition_types::GALERA_READY,
            condition_reasons::BOOTSTRAPPING,
            "Galera cluster is being bootstrapped",
        );
    }

    if conditions.is_true(condition_types::GALERA_READY) {
        if ready_replicas * 2 <= desired {
            warn!(ready_replicas, desired, "Galera cluster lost quorum");
            conditions.set_false(
                condition_types::GALERA_READY,
                condition_reasons::QUORUM_LOST,
                &format!("Only {ready_replicas}/{desired} members are ready"),
            );
        }
        return Ok(());
    }

    if ready_replicas != desired {
        debug!(ready_replicas, desired, "Waiting for Galera members");
        return Ok(());
    }

    disable_bootstrap(agent, members).await?;
    info!("Galera cluster is ready");
    conditions.set_true(
        condition_types::GALERA_READY,
        condition_reasons::GALERA_READY,
        "Galera cluster is ready",
    );
    Ok(())
}
