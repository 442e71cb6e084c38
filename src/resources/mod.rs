pub mod apply;
pub mod common;
pub mod config_map;
pub mod service;
pub mod sql_job;
pub mod statefulset;

pub use apply::{MAX_CONFLICT_RETRIES, json_subset, reconcile_resource};
pub use common::{API_VERSION, FIELD_MANAGER, owner_reference, standard_labels};
pub use config_map::generate_config_map;
pub use service::{generate_internal_service, generate_service};
pub use sql_job::{JobOutcome, generate_job, job_name, job_outcome};
pub use statefulset::generate_statefulset;

use crate::controller::store::SubResource;
use crate::crd::MariaDB;

/// Desired owned objects of a MariaDB, in the order they are reconciled
pub fn desired_resources(mariadb: &MariaDB) -> Vec<SubResource> {
    vec![
        SubResource::ConfigMap(generate_config_map(mariadb)),
        SubResource::Service(generate_service(mariadb)),
        SubResource::Service(generate_internal_service(mariadb)),
        SubResource::StatefulSet(generate_statefulset(mariadb)),
    ]
}
