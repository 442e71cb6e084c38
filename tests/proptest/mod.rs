// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for cron scheduling, MariaDB validation, Galera
//! bootstrap selection and resource generation
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Cron fire times are strictly after the reference instant and match the schedule
//! 2. Invalid specs are always rejected with errors, not panics
//! 3. Validation is deterministic (same input = same output)
//! 4. The bootstrap source is always a most advanced member

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;

use mariadb_operator::agent::{GaleraMember, RecoveryState};
use mariadb_operator::controller::galera::select_bootstrap_source;
use mariadb_operator::controller::validation::{validate_spec, validate_spec_change};
use mariadb_operator::cron::CronSchedule;
use mariadb_operator::crd::{
    GaleraSpec, Image, MariaDB, MariaDBSpec, SecretKeySelector, Storage,
};
use mariadb_operator::resources::{desired_resources, generate_statefulset, json_subset};

// =============================================================================
// Helper functions to reduce spec boilerplate
// =============================================================================

/// Create a minimal valid MariaDB. Override fields on the returned value.
fn minimal_mariadb() -> MariaDB {
    let mut mariadb = MariaDB::new(
        "db",
        MariaDBSpec {
            root_password_secret_key_ref: SecretKeySelector {
                name: "mariadb-root".to_string(),
                key: "password".to_string(),
            },
            database: None,
            image: Image {
                repository: "mariadb".to_string(),
                tag: "10.11.2".to_string(),
                pull_policy: None,
            },
            port: 3306,
            replicas: 1,
            storage: Storage {
                class_name: None,
                size: "1Gi".to_string(),
            },
            galera: None,
            my_cnf: None,
            resources: None,
            suspend: false,
        },
    );
    mariadb.metadata.namespace = Some("default".to_string());
    mariadb.metadata.uid = Some("uid".to_string());
    mariadb
}

fn member(ordinal: i32) -> GaleraMember {
    GaleraMember {
        name: format!("db-{ordinal}"),
        host: format!("db-{ordinal}.db-internal"),
        port: 5555,
        ordinal,
    }
}

// =============================================================================
// Strategy generators
// =============================================================================

/// Instants between 2020 and 2030 with second precision
fn instant() -> impl Strategy<Value = DateTime<Utc>> {
    (1_577_836_800i64..1_893_456_000i64).prop_map(|s| Utc.timestamp_opt(s, 0).unwrap())
}

/// One cron field made of a wildcard, a value, a range or a step
fn cron_field(min: u32, max: u32) -> impl Strategy<Value = String> {
    prop_oneof![
        Just("*".to_string()),
        (min..=max).prop_map(|v| v.to_string()),
        (min..=max, min..=max).prop_map(|(a, b)| format!("{}-{}", a.min(b), a.max(b))),
        (1..=max.max(1)).prop_map(|step| format!("*/{step}")),
        (min..=max, min..=max).prop_map(|(a, b)| format!("{},{}", a, b)),
    ]
}

/// Cron expressions that always have upcoming fire times
fn satisfiable_cron() -> impl Strategy<Value = String> {
    (
        cron_field(0, 59),
        cron_field(0, 23),
        // Days 1-28 exist in every month
        cron_field(1, 28),
        cron_field(1, 12),
        cron_field(0, 6),
    )
        .prop_map(|(m, h, dom, mon, dow)| format!("{m} {h} {dom} {mon} {dow}"))
}

/// Generate a valid replica count (1-100)
fn valid_replicas() -> impl Strategy<Value = i32> {
    1..=100i32
}

/// Generate an invalid replica count (shrinks toward boundary values)
fn invalid_replicas() -> impl Strategy<Value = i32> {
    prop_oneof![(-100..=-1i32), Just(0), (101..=1000i32)]
}

/// Generate a valid storage size (shrinks toward smaller values)
fn valid_storage_size() -> impl Strategy<Value = String> {
    prop_oneof![
        (100..=999u32).prop_map(|n| format!("{}Mi", n)),
        (1..=100u32).prop_map(|n| format!("{}Gi", n)),
        (1..=10u32).prop_map(|n| format!("{}Ti", n)),
    ]
}

/// Generate an invalid storage size
fn invalid_storage_size() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("".to_string()),
        // Missing unit
        (1..=100u32).prop_map(|n| n.to_string()),
        // GB instead of Gi
        (1..=100u32).prop_map(|n| format!("{}GB", n)),
        (1..=100u32).prop_map(|n| format!("-{}Gi", n)),
        (1..=100u32).prop_map(|n| format!("{} Gi", n)),
        "[a-z]{3,8}",
    ]
}

/// Generate a valid MariaDB, standalone or Galera
fn valid_mariadb() -> impl Strategy<Value = MariaDB> {
    (
        valid_replicas(),
        valid_storage_size(),
        any::<bool>(),
        1..=65535i32,
    )
        .prop_map(|(replicas, size, galera, port)| {
            let mut mariadb = minimal_mariadb();
            mariadb.spec.replicas = replicas;
            mariadb.spec.storage.size = size;
            if galera {
                let mut spec = GaleraSpec::default();
                spec.agent.port = port;
                mariadb.spec.galera = Some(spec);
            }
            mariadb
        })
}

/// Reported positions of 1 to 9 members
fn reports() -> impl Strategy<Value = Vec<(GaleraMember, RecoveryState)>> {
    prop::collection::vec((0..50i64, any::<bool>()), 1..=9).prop_map(|positions| {
        positions
            .into_iter()
            .enumerate()
            .map(|(i, (seqno, safe_to_bootstrap))| {
                (
                    member(i as i32),
                    RecoveryState {
                        uuid: "uuid".to_string(),
                        seqno,
                        safe_to_bootstrap,
                    },
                )
            })
            .collect()
    })
}

/// Arbitrary JSON documents a few levels deep
fn json_value() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::from),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z]{0,6}".prop_map(serde_json::Value::from),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::from),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// The next fire time is strictly later, on a minute boundary, and matches
    #[test]
    fn prop_next_fire_time_is_after_and_matches(expr in satisfiable_cron(), after in instant()) {
        let cron = CronSchedule::parse(&expr).unwrap();
        let next = cron.next_after(after).unwrap();
        prop_assert!(next > after);
        prop_assert_eq!(next.timestamp() % 60, 0);
        prop_assert!(cron.matches(next));
    }

    /// No fire time is skipped between `after` and the returned one
    #[test]
    fn prop_next_fire_time_is_the_first(expr in satisfiable_cron(), after in instant()) {
        let cron = CronSchedule::parse(&expr).unwrap();
        let next = cron.next_after(after).unwrap();
        let first_minute = after + Duration::seconds(60 - after.timestamp() % 60);
        let span = (next - first_minute).num_minutes().min(2 * 24 * 60);
        for offset in 0..span {
            prop_assert!(!cron.matches(first_minute + Duration::minutes(offset)));
        }
    }

    /// Parsing never panics on arbitrary input
    #[test]
    fn prop_cron_parse_no_panic(expr in "\\PC{0,40}") {
        let _ = CronSchedule::parse(&expr);
    }

    /// "a/n" fires at a, a+n, ... up to 59 for any step width
    #[test]
    fn prop_stepped_minutes_for_any_step(start in 0..60u32, step in 1..=u32::MAX) {
        let cron = CronSchedule::parse(&format!("{start}/{step} * * * *")).unwrap();
        let hour = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for minute in 0..60u32 {
            let expected = minute >= start && (minute - start) % step == 0;
            prop_assert_eq!(cron.matches(hour + Duration::minutes(i64::from(minute))), expected);
        }
    }

    #[test]
    fn prop_valid_spec_passes_validation(mariadb in valid_mariadb()) {
        prop_assert!(validate_spec(&mariadb).is_ok(), "{:?}", validate_spec(&mariadb));
    }

    #[test]
    fn prop_invalid_replicas_rejected(replicas in invalid_replicas()) {
        let mut mariadb = minimal_mariadb();
        mariadb.spec.replicas = replicas;
        let err = validate_spec(&mariadb).unwrap_err();
        prop_assert!(err.to_string().contains("spec.replicas"));
    }

    #[test]
    fn prop_invalid_storage_rejected(size in invalid_storage_size()) {
        let mut mariadb = minimal_mariadb();
        mariadb.spec.storage.size = size;
        let err = validate_spec(&mariadb).unwrap_err();
        prop_assert!(err.to_string().contains("spec.storage.size"));
    }

    #[test]
    fn prop_validation_deterministic(mariadb in valid_mariadb()) {
        let first = validate_spec(&mariadb).is_ok();
        let second = validate_spec(&mariadb).is_ok();
        prop_assert_eq!(first, second);
    }

    /// Scaling and resizing never trip the update checks
    #[test]
    fn prop_spec_change_allows_scaling(old in valid_mariadb(), replicas in valid_replicas()) {
        let mut new = old.clone();
        new.spec.replicas = replicas;
        prop_assert!(validate_spec_change(&old, &new).is_ok());
    }

    /// The selected member has the highest seqno and no better-ranked peer
    #[test]
    fn prop_bootstrap_source_is_most_advanced(reports in reports()) {
        let idx = select_bootstrap_source(&reports).unwrap();
        let (chosen, state) = &reports[idx];
        let max_seqno = reports.iter().map(|(_, s)| s.seqno).max().unwrap();
        prop_assert_eq!(state.seqno, max_seqno);

        for (other, other_state) in &reports {
            if other_state.seqno != max_seqno || other == chosen {
                continue;
            }
            if other_state.safe_to_bootstrap == state.safe_to_bootstrap {
                prop_assert!(chosen.ordinal < other.ordinal);
            } else {
                prop_assert!(state.safe_to_bootstrap);
            }
        }
    }

    /// Selection does not depend on report order
    #[test]
    fn prop_bootstrap_source_order_independent(reports in reports()) {
        let idx = select_bootstrap_source(&reports).unwrap();
        let mut reversed = reports.clone();
        reversed.reverse();
        let rev_idx = select_bootstrap_source(&reversed).unwrap();
        prop_assert_eq!(&reports[idx].0, &reversed[rev_idx].0);
    }

    #[test]
    fn prop_json_subset_reflexive(value in json_value()) {
        prop_assert!(json_subset(&value, &value));
    }

    /// Adding a field to the live object never creates drift
    #[test]
    fn prop_json_subset_ignores_extra_fields(value in json_value(), extra in json_value()) {
        let desired = json!({ "spec": value });
        let live = json!({ "spec": value.clone(), "status": extra });
        prop_assert!(json_subset(&desired, &live));
    }

    #[test]
    fn prop_statefulset_replicas_match(mariadb in valid_mariadb()) {
        let sts = generate_statefulset(&mariadb);
        let spec = sts.spec.unwrap();
        prop_assert_eq!(spec.replicas, Some(mariadb.spec.replicas));
        let expected_policy = if mariadb.spec.galera.is_some() { "Parallel" } else { "OrderedReady" };
        prop_assert_eq!(spec.pod_management_policy.as_deref(), Some(expected_policy));
    }

    /// Generated objects are their own fixed point under the drift check
    #[test]
    fn prop_desired_resources_are_stable(mariadb in valid_mariadb()) {
        for resource in desired_resources(&mariadb) {
            let value = resource.to_value().unwrap();
            prop_assert!(json_subset(&value, &value));
            prop_assert_eq!(resource.namespace(), "default");
        }
    }
}
