//! Service generation for MariaDB clusters
//!
//! Every cluster gets a client Service and a headless internal Service. The
//! headless one gives each pod a stable DNS name, used both for the Galera
//! cluster address and for reaching member agents.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec as K8sServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::MariaDB;
use crate::mariadb::config::{GALERA_IST_PORT, GALERA_REPLICATION_PORT, GALERA_SST_PORT};
use crate::resources::common::{owner_reference, selector_labels, standard_labels};

/// Generate the client Service
pub fn generate_service(mariadb: &MariaDB) -> Service {
    let cluster_name = mariadb.name_any();

    Service {
        metadata: ObjectMeta {
            name: Some(mariadb.service_name()),
            namespace: mariadb.namespace(),
            labels: Some(standard_labels(&cluster_name)),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            selector: Some(selector_labels(&cluster_name)),
            ports: Some(vec![port("mariadb", mariadb.spec.port)]),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Generate the headless internal Service
///
/// Not-ready pods are published so members can find each other while the
/// replication group is still forming.
pub fn generate_internal_service(mariadb: &MariaDB) -> Service {
    let cluster_name = mariadb.name_any();

    let mut ports = vec![port("mariadb", mariadb.spec.port)];
    if let Some(galera) = &mariadb.spec.galera {
        ports.push(port("cluster", GALERA_REPLICATION_PORT));
        ports.push(port("ist", GALERA_IST_PORT));
        ports.push(port("sst", GALERA_SST_PORT));
        ports.push(port("agent", galera.agent.port));
    }

    Service {
        metadata: ObjectMeta {
            name: Some(mariadb.internal_service_name()),
            namespace: mariadb.namespace(),
            labels: Some(standard_labels(&cluster_name)),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        spec: Some(K8sServiceSpec {
            cluster_ip: Some("None".to_string()),
            publish_not_ready_addresses: Some(true),
            selector: Some(selector_labels(&cluster_name)),
            ports: Some(ports),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn port(name: &str, number: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port: number,
        target_port: Some(IntOrString::Int(number)),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}
