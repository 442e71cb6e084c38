//! SqlJob passes: dispatch, tracking and gates against in-memory fakes

use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::Action;
use mariadb_operator::controller::{SqlJobOutcome, WaitReason, reconcile_sql_job, sql_job_pass};
use mariadb_operator::crd::{ConditionStatus, condition_reasons};
use mariadb_operator::resources::job_name;

use crate::common::*;

const NS: &str = "default";

fn harness_with_ready_cluster() -> Harness {
    let h = Harness::new(test_now());
    h.store.insert_cluster(
        MariaDBBuilder::new("db", NS)
            .with_status(ready_status())
            .build(),
    );
    h
}

fn complete(h: &Harness, name: &str) -> Option<(ConditionStatus, String)> {
    let status = h.store.sql_job_status(NS, name);
    status
        .complete_condition()
        .map(|c| (c.status, c.reason.clone()))
}

#[tokio::test]
async fn test_one_shot_lifecycle() {
    let h = harness_with_ready_cluster();
    h.store.insert_sql_job(
        SqlJobBuilder::new("create-table", NS, "db")
            .with_sql("CREATE TABLE t (id INT);")
            .build(),
    );

    let outcome = sql_job_pass(&h.ctx, NS, "create-table").await.unwrap();
    assert_eq!(
        outcome,
        SqlJobOutcome::Dispatched {
            job: "create-table".to_string()
        }
    );
    assert_eq!(h.store.job_names(), vec!["create-table"]);
    let status = h.store.sql_job_status(NS, "create-table");
    assert_eq!(status.active_job.as_deref(), Some("create-table"));
    assert!(status.last_schedule_time.is_some());
    assert_eq!(
        complete(&h, "create-table"),
        Some((ConditionStatus::False, condition_reasons::JOB_RUNNING.to_string()))
    );

    // Still running
    let outcome = sql_job_pass(&h.ctx, NS, "create-table").await.unwrap();
    assert!(matches!(outcome, SqlJobOutcome::Running { .. }));

    h.store.finish_job(NS, "create-table", true);
    let outcome = sql_job_pass(&h.ctx, NS, "create-table").await.unwrap();
    assert_eq!(outcome, SqlJobOutcome::Done);

    let status = h.store.sql_job_status(NS, "create-table");
    assert!(status.active_job.is_none());
    assert!(status.last_success_time.is_some());
    assert_eq!(
        complete(&h, "create-table"),
        Some((ConditionStatus::True, condition_reasons::JOB_COMPLETE.to_string()))
    );

    // Never dispatched again
    h.store.clear_writes();
    let outcome = sql_job_pass(&h.ctx, NS, "create-table").await.unwrap();
    assert_eq!(outcome, SqlJobOutcome::Done);
    assert_eq!(h.store.write_count(), 0);
    assert_eq!(h.store.job_names().len(), 1);
}

#[tokio::test]
async fn test_failed_run_is_recorded() {
    let h = harness_with_ready_cluster();
    h.store.insert_sql_job(
        SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT broken;")
            .build(),
    );

    sql_job_pass(&h.ctx, NS, "job").await.unwrap();
    h.store.finish_job(NS, "job", false);
    sql_job_pass(&h.ctx, NS, "job").await.unwrap();

    let status = h.store.sql_job_status(NS, "job");
    assert!(status.last_success_time.is_none());
    assert!(status.active_job.is_none());
    assert_eq!(
        complete(&h, "job"),
        Some((ConditionStatus::False, condition_reasons::JOB_FAILED.to_string()))
    );
}

#[tokio::test]
async fn test_dependent_job_waits_for_dependency() {
    let h = harness_with_ready_cluster();
    h.store.insert_sql_job(
        SqlJobBuilder::new("create-table", NS, "db")
            .with_sql("CREATE TABLE t (id INT);")
            .build(),
    );
    h.store.insert_sql_job(
        SqlJobBuilder::new("insert", NS, "db")
            .with_sql("INSERT INTO t VALUES (1);")
            .depends_on("create-table")
            .build(),
    );

    let outcome = sql_job_pass(&h.ctx, NS, "insert").await.unwrap();
    assert!(matches!(
        outcome,
        SqlJobOutcome::Waiting {
            reason: WaitReason::DependencyNotSucceeded(_),
            ..
        }
    ));
    assert!(h.store.job_names().is_empty());

    // The dependency runs and succeeds
    sql_job_pass(&h.ctx, NS, "create-table").await.unwrap();
    h.store.finish_job(NS, "create-table", true);
    sql_job_pass(&h.ctx, NS, "create-table").await.unwrap();

    let outcome = sql_job_pass(&h.ctx, NS, "insert").await.unwrap();
    assert_eq!(
        outcome,
        SqlJobOutcome::Dispatched {
            job: "insert".to_string()
        }
    );
}

#[tokio::test]
async fn test_waits_for_cluster_readiness() {
    let h = Harness::new(test_now());
    h.store.insert_cluster(create_test_mariadb("db", NS, 1));
    h.store.insert_sql_job(
        SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .build(),
    );

    let outcome = sql_job_pass(&h.ctx, NS, "job").await.unwrap();
    assert!(matches!(
        outcome,
        SqlJobOutcome::Waiting {
            reason: WaitReason::ClusterNotReady(_),
            ..
        }
    ));
    assert!(h.store.job_names().is_empty());
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_scheduled_runs_get_one_job_per_slot() {
    let h = harness_with_ready_cluster();
    h.clock.set(time("2024-05-01T12:05:10Z"));
    h.store.insert_sql_job(
        SqlJobBuilder::new("cleanup", NS, "db")
            .with_sql("DELETE FROM sessions;")
            .with_schedule("*/5 * * * *")
            .created_at(time("2024-05-01T12:00:10Z"))
            .build(),
    );

    let outcome = sql_job_pass(&h.ctx, NS, "cleanup").await.unwrap();
    let first = job_name(
        &h.store.sql_job(NS, "cleanup"),
        Some(time("2024-05-01T12:05:00Z")),
    );
    assert_eq!(outcome, SqlJobOutcome::Dispatched { job: first.clone() });
    assert_eq!(
        h.store.sql_job_status(NS, "cleanup").last_schedule_time,
        Some(time("2024-05-01T12:05:00Z").to_rfc3339())
    );

    h.store.finish_job(NS, &first, true);
    let outcome = sql_job_pass(&h.ctx, NS, "cleanup").await.unwrap();
    assert_eq!(
        outcome,
        SqlJobOutcome::Waiting {
            reason: WaitReason::NotDue {
                next: time("2024-05-01T12:10:00Z")
            },
            retry_after: Some(Duration::from_secs(290)),
        }
    );

    h.clock.set(time("2024-05-01T12:10:01Z"));
    let outcome = sql_job_pass(&h.ctx, NS, "cleanup").await.unwrap();
    let SqlJobOutcome::Dispatched { job: second } = outcome else {
        panic!("expected a dispatch, got {:?}", outcome);
    };
    assert_ne!(first, second);
    assert_eq!(h.store.job_names().len(), 2);
}

#[tokio::test]
async fn test_lost_status_write_does_not_duplicate_job() {
    let h = harness_with_ready_cluster();
    h.store.insert_sql_job(
        SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .build(),
    );
    h.store.fail_status_patches(1);

    assert!(sql_job_pass(&h.ctx, NS, "job").await.is_err());
    assert_eq!(h.store.job_names(), vec!["job"]);

    let outcome = sql_job_pass(&h.ctx, NS, "job").await.unwrap();
    assert!(matches!(outcome, SqlJobOutcome::Dispatched { .. }));
    assert_eq!(h.store.job_names(), vec!["job"]);
}

#[tokio::test]
async fn test_config_map_source_is_mounted() {
    let h = harness_with_ready_cluster();
    h.store.insert_sql_job(
        SqlJobBuilder::new("job", NS, "db")
            .with_config_map("sql-scripts", "migrate.sql")
            .build(),
    );

    sql_job_pass(&h.ctx, NS, "job").await.unwrap();
    let job = h.store.job(NS, "job").unwrap();
    let pod = job.spec.unwrap().template.spec.unwrap();
    let volumes = pod.volumes.unwrap();
    assert_eq!(volumes[0].config_map.as_ref().unwrap().name, "sql-scripts");
    assert!(
        pod.containers[0]
            .env
            .as_ref()
            .unwrap()
            .iter()
            .all(|e| e.name != "SQL")
    );
}

#[tokio::test]
async fn test_missing_sql_job_is_gone() {
    let h = harness_with_ready_cluster();
    let outcome = sql_job_pass(&h.ctx, NS, "nope").await.unwrap();
    assert_eq!(outcome, SqlJobOutcome::Gone);
}

#[tokio::test]
async fn test_actions() {
    let h = harness_with_ready_cluster();
    let job = SqlJobBuilder::new("job", NS, "db")
        .with_sql("SELECT 1;")
        .build();
    h.store.insert_sql_job(job.clone());
    let ctx = Arc::new(h.ctx);

    let action = reconcile_sql_job(Arc::new(job.clone()), ctx.clone())
        .await
        .unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(10)));

    h.store.finish_job(NS, "job", true);
    let action = reconcile_sql_job(Arc::new(job), ctx).await.unwrap();
    assert_eq!(action, Action::await_change());
}
