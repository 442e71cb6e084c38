//! SqlJob run decisions: schedule, cluster readiness and dependency gates

use std::time::Duration;

use mariadb_operator::controller::sql_job_scheduler::{GATE_RETRY, dependency_gate, next_run};
use mariadb_operator::controller::{Dependency, RunDecision, WaitReason, decide};
use mariadb_operator::cron::CronSchedule;
use mariadb_operator::crd::{MariaDB, SqlJobStatus};

use crate::common::*;

const NS: &str = "default";

fn ready_cluster() -> MariaDB {
    MariaDBBuilder::new("db", NS)
        .with_status(ready_status())
        .build()
}

fn dependency(name: &str, succeeded: bool) -> Dependency {
    let mut builder = SqlJobBuilder::new(name, NS, "db").with_sql("SELECT 1;");
    if succeeded {
        builder = builder.succeeded();
    }
    Dependency {
        name: name.to_string(),
        job: Some(builder.build()),
    }
}

mod one_shot {
    use super::*;

    #[test]
    fn test_runs_once_when_gates_pass() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .build();
        let decision = decide(&job, Some(&ready_cluster()), &[], test_now()).unwrap();
        assert_eq!(decision, RunDecision::Run { scheduled_at: None });
    }

    #[test]
    fn test_done_after_dispatch() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .with_status(SqlJobStatus {
                last_schedule_time: Some("2024-05-01T10:00:00+00:00".to_string()),
                ..Default::default()
            })
            .build();
        let decision = decide(&job, Some(&ready_cluster()), &[], test_now()).unwrap();
        assert_eq!(decision, RunDecision::Done);
    }
}

mod cluster_gate {
    use super::*;

    #[test]
    fn test_waits_for_missing_cluster() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .build();
        let decision = decide(&job, None, &[], test_now()).unwrap();
        assert_eq!(
            decision,
            RunDecision::Wait {
                reason: WaitReason::ClusterNotFound("db".to_string()),
                retry_after: Some(GATE_RETRY),
            }
        );
    }

    #[test]
    fn test_waits_for_ready_cluster() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .build();
        let not_ready = create_test_mariadb("db", NS, 1);
        let decision = decide(&job, Some(&not_ready), &[], test_now()).unwrap();
        assert!(matches!(
            decision,
            RunDecision::Wait {
                reason: WaitReason::ClusterNotReady(_),
                ..
            }
        ));
    }
}

mod dependency_gate_tests {
    use super::*;

    #[test]
    fn test_never_runs_before_dependency_succeeds() {
        let job = SqlJobBuilder::new("insert-users", NS, "db")
            .with_sql("INSERT INTO users VALUES (1);")
            .depends_on("create-table")
            .build();
        let deps = vec![dependency("create-table", false)];

        for minutes in [0, 10, 60, 24 * 60] {
            let now = test_now() + chrono::Duration::minutes(minutes);
            let decision = decide(&job, Some(&ready_cluster()), &deps, now).unwrap();
            assert_eq!(
                decision,
                RunDecision::Wait {
                    reason: WaitReason::DependencyNotSucceeded("create-table".to_string()),
                    retry_after: Some(GATE_RETRY),
                }
            );
        }
    }

    #[test]
    fn test_missing_dependency_defers() {
        let deps = vec![Dependency {
            name: "create-table".to_string(),
            job: None,
        }];
        assert_eq!(
            dependency_gate(&deps),
            Some(WaitReason::DependencyNotFound("create-table".to_string()))
        );
    }

    #[test]
    fn test_runs_once_all_dependencies_succeeded() {
        let job = SqlJobBuilder::new("insert-users", NS, "db")
            .with_sql("INSERT INTO users VALUES (1);")
            .depends_on("create-table")
            .depends_on("create-index")
            .build();
        let deps = vec![
            dependency("create-table", true),
            dependency("create-index", true),
        ];
        let decision = decide(&job, Some(&ready_cluster()), &deps, test_now()).unwrap();
        assert_eq!(decision, RunDecision::Run { scheduled_at: None });
    }

    #[test]
    fn test_first_unmet_dependency_is_reported() {
        let deps = vec![
            dependency("a", true),
            dependency("b", false),
            Dependency {
                name: "c".to_string(),
                job: None,
            },
        ];
        assert_eq!(
            dependency_gate(&deps),
            Some(WaitReason::DependencyNotSucceeded("b".to_string()))
        );
    }
}

mod schedule {
    use super::*;

    fn scheduled(cron: &str) -> mariadb_operator::crd::SqlJob {
        SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .with_schedule(cron)
            .created_at(time("2024-05-01T12:00:10Z"))
            .build()
    }

    #[test]
    fn test_next_run_after_creation() {
        let job = scheduled("*/5 * * * *");
        let cron = CronSchedule::parse("*/5 * * * *").unwrap();
        assert_eq!(next_run(&job, &cron), Some(time("2024-05-01T12:05:00Z")));
    }

    #[test]
    fn test_next_run_after_last_schedule() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .with_schedule("0 * * * *")
            .with_status(SqlJobStatus {
                last_schedule_time: Some("2024-05-01T12:00:00+00:00".to_string()),
                ..Default::default()
            })
            .build();
        let cron = CronSchedule::parse("0 * * * *").unwrap();
        assert_eq!(next_run(&job, &cron), Some(time("2024-05-01T13:00:00Z")));
    }

    #[test]
    fn test_not_due_waits_until_next_slot() {
        let job = scheduled("*/5 * * * *");
        let now = time("2024-05-01T12:03:00Z");
        let decision = decide(&job, Some(&ready_cluster()), &[], now).unwrap();
        assert_eq!(
            decision,
            RunDecision::Wait {
                reason: WaitReason::NotDue {
                    next: time("2024-05-01T12:05:00Z")
                },
                retry_after: Some(Duration::from_secs(120)),
            }
        );
    }

    #[test]
    fn test_due_slot_runs() {
        let job = scheduled("*/5 * * * *");
        let now = time("2024-05-01T12:05:20Z");
        let decision = decide(&job, Some(&ready_cluster()), &[], now).unwrap();
        assert_eq!(
            decision,
            RunDecision::Run {
                scheduled_at: Some(time("2024-05-01T12:05:00Z"))
            }
        );
    }

    #[test]
    fn test_missed_slots_collapse_into_latest() {
        let job = scheduled("*/5 * * * *");
        let now = time("2024-05-01T13:02:00Z");
        let decision = decide(&job, Some(&ready_cluster()), &[], now).unwrap();
        assert_eq!(
            decision,
            RunDecision::Run {
                scheduled_at: Some(time("2024-05-01T13:00:00Z"))
            }
        );
    }

    #[test]
    fn test_suspended_schedule_waits_for_change() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .with_schedule("* * * * *")
            .suspended()
            .build();
        let decision = decide(&job, Some(&ready_cluster()), &[], test_now()).unwrap();
        assert_eq!(
            decision,
            RunDecision::Wait {
                reason: WaitReason::Suspended,
                retry_after: None,
            }
        );
    }

    #[test]
    fn test_schedule_checked_before_dependencies() {
        let job = SqlJobBuilder::new("job", NS, "db")
            .with_sql("SELECT 1;")
            .with_schedule("*/5 * * * *")
            .created_at(time("2024-05-01T12:00:10Z"))
            .depends_on("other")
            .build();
        let decision = decide(&job, None, &[], time("2024-05-01T12:01:00Z")).unwrap();
        assert!(matches!(
            decision,
            RunDecision::Wait {
                reason: WaitReason::NotDue { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_cron_is_an_error() {
        let job = scheduled("not a cron");
        assert!(decide(&job, Some(&ready_cluster()), &[], test_now()).is_err());
    }

    #[test]
    fn test_impossible_date_has_no_upcoming_run() {
        let job = scheduled("0 0 30 2 *");
        let decision = decide(&job, Some(&ready_cluster()), &[], test_now()).unwrap();
        assert_eq!(
            decision,
            RunDecision::Wait {
                reason: WaitReason::NoUpcomingRun,
                retry_after: None,
            }
        );
    }
}
