//! Configuration ConfigMap for MariaDB clusters

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::MariaDB;
use crate::mariadb::config::{GALERA_CNF_KEY, MY_CNF_KEY, generate_galera_cnf, generate_my_cnf};
use crate::resources::common::{owner_reference, standard_labels};

/// Generate the ConfigMap holding `my.cnf` and, with Galera, `galera.cnf`
pub fn generate_config_map(mariadb: &MariaDB) -> ConfigMap {
    let mut data = BTreeMap::from([(MY_CNF_KEY.to_string(), generate_my_cnf(mariadb))]);
    if let Some(galera_cnf) = generate_galera_cnf(mariadb) {
        data.insert(GALERA_CNF_KEY.to_string(), galera_cnf);
    }

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(mariadb.config_map_name()),
            namespace: mariadb.namespace(),
            labels: Some(standard_labels(&mariadb.name_any())),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}
