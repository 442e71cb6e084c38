//! Test fixtures and builders for MariaDB and SqlJob resources
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let db = create_test_mariadb("db", "default", 1);
//! let galera = MariaDBBuilder::new("db", "default").with_galera().with_replicas(3).build();
//! let job = SqlJobBuilder::new("job", "default", "db").with_sql("SELECT 1;").build();
//! ```

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::core::ObjectMeta;
use mariadb_operator::crd::{
    Condition, ConditionStatus, ConfigMapKeySelector, GaleraSpec, Image, LocalObjectReference,
    MariaDB, MariaDBSpec, MariaDBStatus, Schedule, SecretKeySelector, SqlJob, SqlJobSpec,
    SqlJobStatus, Storage, condition_reasons, condition_types,
};

/// Fixed point in time used as "now" across tests
pub fn test_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:30Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn time(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

/// Object metadata timestamp for `at`
pub fn k8s_time(at: DateTime<Utc>) -> Time {
    Time(jiff::Timestamp::from_second(at.timestamp()).unwrap())
}

/// Create a standalone MariaDB with minimal configuration
pub fn create_test_mariadb(name: &str, namespace: &str, replicas: i32) -> MariaDB {
    MariaDBBuilder::new(name, namespace)
        .with_replicas(replicas)
        .build()
}

/// Create a MariaDB with Galera enabled
pub fn create_galera_mariadb(name: &str, namespace: &str, replicas: i32) -> MariaDB {
    MariaDBBuilder::new(name, namespace)
        .with_replicas(replicas)
        .with_galera()
        .build()
}

pub fn condition(type_: &str, status: ConditionStatus, reason: &str) -> Condition {
    Condition {
        type_: type_.to_string(),
        status,
        reason: reason.to_string(),
        message: String::new(),
        last_transition_time: "2024-05-01T00:00:00+00:00".to_string(),
        observed_generation: Some(1),
    }
}

/// Status of a MariaDB that is Ready
pub fn ready_status() -> MariaDBStatus {
    MariaDBStatus {
        conditions: vec![condition(
            condition_types::READY,
            ConditionStatus::True,
            condition_reasons::STATEFULSET_READY,
        )],
        ready_replicas: 1,
        observed_generation: Some(1),
    }
}

/// Builder for MariaDB resources
pub struct MariaDBBuilder {
    name: String,
    namespace: String,
    uid: Option<String>,
    generation: Option<i64>,
    resource_version: Option<String>,
    replicas: i32,
    storage_size: String,
    storage_class: Option<String>,
    galera: Option<GaleraSpec>,
    database: Option<String>,
    my_cnf: Option<String>,
    suspend: bool,
    deleting: bool,
    status: Option<MariaDBStatus>,
}

#[allow(dead_code)]
impl MariaDBBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            uid: Some("test-uid-12345".to_string()),
            generation: Some(1),
            resource_version: None,
            replicas: 1,
            storage_size: "1Gi".to_string(),
            storage_class: Some("standard".to_string()),
            galera: None,
            database: None,
            my_cnf: None,
            suspend: false,
            deleting: false,
            status: None,
        }
    }

    pub fn with_replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn with_storage(mut self, size: &str, class: Option<&str>) -> Self {
        self.storage_size = size.to_string();
        self.storage_class = class.map(String::from);
        self
    }

    pub fn with_galera(mut self) -> Self {
        self.galera = Some(GaleraSpec::default());
        self
    }

    pub fn with_agent_port(mut self, port: i32) -> Self {
        let mut galera = self.galera.unwrap_or_default();
        galera.agent.port = port;
        self.galera = Some(galera);
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_my_cnf(mut self, my_cnf: &str) -> Self {
        self.my_cnf = Some(my_cnf.to_string());
        self
    }

    pub fn with_generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    pub fn with_resource_version(mut self, resource_version: &str) -> Self {
        self.resource_version = Some(resource_version.to_string());
        self
    }

    pub fn suspended(mut self) -> Self {
        self.suspend = true;
        self
    }

    pub fn deleting(mut self) -> Self {
        self.deleting = true;
        self
    }

    pub fn with_status(mut self, status: MariaDBStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_condition(mut self, type_: &str, status: ConditionStatus, reason: &str) -> Self {
        let mut current = self.status.unwrap_or_default();
        current.conditions.retain(|c| c.type_ != type_);
        current.conditions.push(condition(type_, status, reason));
        self.status = Some(current);
        self
    }

    pub fn build(self) -> MariaDB {
        MariaDB {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                uid: self.uid,
                generation: self.generation,
                resource_version: self.resource_version,
                deletion_timestamp: self.deleting.then(|| k8s_time(test_now())),
                ..Default::default()
            },
            spec: MariaDBSpec {
                root_password_secret_key_ref: SecretKeySelector {
                    name: "mariadb-root".to_string(),
                    key: "password".to_string(),
                },
                database: self.database,
                image: Image {
                    repository: "mariadb".to_string(),
                    tag: "10.11.2".to_string(),
                    pull_policy: None,
                },
                port: 3306,
                replicas: self.replicas,
                storage: Storage {
                    class_name: self.storage_class,
                    size: self.storage_size,
                },
                galera: self.galera,
                my_cnf: self.my_cnf,
                resources: None,
                suspend: self.suspend,
            },
            status: self.status,
        }
    }
}

/// Builder for SqlJob resources
pub struct SqlJobBuilder {
    name: String,
    namespace: String,
    mariadb: String,
    sql: Option<String>,
    config_map: Option<ConfigMapKeySelector>,
    database: Option<String>,
    schedule: Option<Schedule>,
    depends_on: Vec<LocalObjectReference>,
    created_at: DateTime<Utc>,
    resource_version: Option<String>,
    status: Option<SqlJobStatus>,
}

#[allow(dead_code)]
impl SqlJobBuilder {
    pub fn new(name: &str, namespace: &str, mariadb: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            mariadb: mariadb.to_string(),
            sql: None,
            config_map: None,
            database: None,
            schedule: None,
            depends_on: Vec::new(),
            created_at: time("2024-05-01T00:00:00Z"),
            resource_version: None,
            status: None,
        }
    }

    pub fn with_sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }

    pub fn with_config_map(mut self, name: &str, key: &str) -> Self {
        self.config_map = Some(ConfigMapKeySelector {
            name: name.to_string(),
            key: key.to_string(),
        });
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn with_schedule(mut self, cron: &str) -> Self {
        self.schedule = Some(Schedule {
            cron: cron.to_string(),
            suspend: false,
        });
        self
    }

    pub fn suspended(mut self) -> Self {
        if let Some(schedule) = self.schedule.as_mut() {
            schedule.suspend = true;
        }
        self
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.depends_on.push(LocalObjectReference::new(name));
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn with_resource_version(mut self, resource_version: &str) -> Self {
        self.resource_version = Some(resource_version.to_string());
        self
    }

    pub fn with_status(mut self, status: SqlJobStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Mark the job as having succeeded once
    pub fn succeeded(mut self) -> Self {
        let mut status = self.status.unwrap_or_default();
        status.last_schedule_time = Some("2024-05-01T00:00:00+00:00".to_string());
        status.last_success_time = Some("2024-05-01T00:01:00+00:00".to_string());
        self.status = Some(status);
        self
    }

    pub fn build(self) -> SqlJob {
        SqlJob {
            metadata: ObjectMeta {
                name: Some(self.name),
                namespace: Some(self.namespace),
                uid: Some("sqljob-uid".to_string()),
                generation: Some(1),
                resource_version: self.resource_version,
                creation_timestamp: Some(k8s_time(self.created_at)),
                ..Default::default()
            },
            spec: SqlJobSpec {
                maria_db_ref: LocalObjectReference::new(self.mariadb),
                database: self.database,
                sql: self.sql,
                sql_config_map_key_ref: self.config_map,
                username: "app".to_string(),
                password_secret_key_ref: SecretKeySelector {
                    name: "app-password".to_string(),
                    key: "password".to_string(),
                },
                schedule: self.schedule,
                depends_on: self.depends_on,
                backoff_limit: 5,
                restart_policy: "OnFailure".to_string(),
                resources: None,
            },
            status: self.status,
        }
    }
}
