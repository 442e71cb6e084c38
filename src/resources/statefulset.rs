//! StatefulSet generation for MariaDB clusters
//!
//! A standalone server starts pods in order. With Galera every pod starts in
//! parallel next to an agent sidecar, and the operator decides through the
//! agents which member bootstraps the replication group.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{
    RollingUpdateStatefulSetStrategy, StatefulSet, StatefulSetPersistentVolumeClaimRetentionPolicy,
    StatefulSetSpec, StatefulSetUpdateStrategy,
};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EnvVar, EnvVarSource, ExecAction,
    HTTPGetAction, ObjectFieldSelector, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, Probe, SecretKeySelector as K8sSecretKeySelector, Volume, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use kube::core::ObjectMeta;

use crate::crd::{GaleraSpec, MariaDB};
use crate::mariadb::command::Command;
use crate::mariadb::config::{
    CONFIG_DIR, GALERA_IST_PORT, GALERA_REPLICATION_PORT, GALERA_SST_PORT,
};
use crate::resources::common::{
    owner_reference, selector_labels, standard_labels, to_k8s_resources,
};

const DATA_VOLUME: &str = "storage";
const DATA_DIR: &str = "/var/lib/mysql";
const CONFIG_VOLUME: &str = "config";

/// Generate the server StatefulSet
pub fn generate_statefulset(mariadb: &MariaDB) -> StatefulSet {
    let name = mariadb.name_any();
    let labels = standard_labels(&name);
    let galera = mariadb.spec.galera.as_ref();

    let mut containers = vec![server_container(mariadb)];
    if let Some(galera) = galera {
        containers.push(agent_container(mariadb, galera));
    }

    // Galera members must all be up for the operator to pick a bootstrap node
    let pod_management_policy = if galera.is_some() {
        "Parallel"
    } else {
        "OrderedReady"
    };

    StatefulSet {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: mariadb.namespace(),
            labels: Some(labels.clone()),
            owner_references: Some(vec![owner_reference(mariadb)]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            service_name: Some(mariadb.internal_service_name()),
            replicas: Some(mariadb.spec.replicas),
            selector: LabelSelector {
                match_labels: Some(selector_labels(&name)),
                ..Default::default()
            },
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateStatefulSetStrategy {
                    partition: Some(0),
                    ..Default::default()
                }),
            }),
            pod_management_policy: Some(pod_management_policy.to_string()),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers,
                    volumes: Some(vec![Volume {
                        name: CONFIG_VOLUME.to_string(),
                        config_map: Some(ConfigMapVolumeSource {
                            name: mariadb.config_map_name(),
                            default_mode: Some(0o644),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    termination_grace_period_seconds: Some(30),
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![volume_claim_template(mariadb)]),
            persistent_volume_claim_retention_policy: Some(
                StatefulSetPersistentVolumeClaimRetentionPolicy {
                    when_deleted: Some("Retain".to_string()),
                    when_scaled: Some("Retain".to_string()),
                },
            ),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn server_container(mariadb: &MariaDB) -> Container {
    let port = mariadb.spec.port;

    let mut env = vec![EnvVar {
        name: "MARIADB_ROOT_PASSWORD".to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(K8sSecretKeySelector {
                name: mariadb.spec.root_password_secret_key_ref.name.clone(),
                key: mariadb.spec.root_password_secret_key_ref.key.clone(),
                optional: Some(false),
            }),
            ..Default::default()
        }),
        ..Default::default()
    }];
    if let Some(database) = &mariadb.spec.database {
        env.push(EnvVar {
            name: "MARIADB_DATABASE".to_string(),
            value: Some(database.clone()),
            ..Default::default()
        });
    }

    let mut ports = vec![container_port("mariadb", port)];
    if mariadb.spec.galera.is_some() {
        ports.push(container_port("cluster", GALERA_REPLICATION_PORT));
        ports.push(container_port("ist", GALERA_IST_PORT));
        ports.push(container_port("sst", GALERA_SST_PORT));
    }

    let health = Command::exec(&["mariadb -u root -p\"${MARIADB_ROOT_PASSWORD}\" -e 'SELECT 1;'"]);
    let health_command = [health.command, health.args].concat();

    Container {
        name: "mariadb".to_string(),
        image: Some(mariadb.spec.image.reference()),
        image_pull_policy: mariadb.spec.image.pull_policy.clone(),
        ports: Some(ports),
        env: Some(env),
        volume_mounts: Some(vec![
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_DIR.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        resources: to_k8s_resources(mariadb.spec.resources.as_ref()),
        readiness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(health_command.clone()),
            }),
            initial_delay_seconds: Some(20),
            period_seconds: Some(10),
            timeout_seconds: Some(5),
            failure_threshold: Some(3),
            ..Default::default()
        }),
        liveness_probe: Some(Probe {
            exec: Some(ExecAction {
                command: Some(health_command),
            }),
            initial_delay_seconds: Some(60),
            period_seconds: Some(10),
            timeout_seconds: Some(5),
            failure_threshold: Some(6),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn agent_container(mariadb: &MariaDB, galera: &GaleraSpec) -> Container {
    let image = galera
        .agent
        .image
        .as_ref()
        .unwrap_or(&mariadb.spec.image);

    Container {
        name: "agent".to_string(),
        image: Some(image.reference()),
        image_pull_policy: image.pull_policy.clone(),
        args: Some(vec![
            "agent".to_string(),
            format!("--addr=:{}", galera.agent.port),
            format!("--config-dir={CONFIG_DIR}"),
            format!("--state-dir={DATA_DIR}"),
        ]),
        ports: Some(vec![container_port("agent", galera.agent.port)]),
        env: Some(vec![EnvVar {
            name: "POD_NAME".to_string(),
            value_from: Some(EnvVarSource {
                field_ref: Some(ObjectFieldSelector {
                    field_path: "metadata.name".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: DATA_DIR.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: CONFIG_VOLUME.to_string(),
                mount_path: CONFIG_DIR.to_string(),
                read_only: Some(true),
                ..Default::default()
            },
        ]),
        readiness_probe: Some(Probe {
            http_get: Some(HTTPGetAction {
                path: Some("/api/galera/state".to_string()),
                port: IntOrString::Int(galera.agent.port),
                scheme: Some("HTTP".to_string()),
                ..Default::default()
            }),
            period_seconds: Some(10),
            timeout_seconds: Some(5),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn volume_claim_template(mariadb: &MariaDB) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: mariadb.spec.storage.class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(mariadb.spec.storage.size.clone()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn container_port(name: &str, port: i32) -> ContainerPort {
    ContainerPort {
        container_port: port,
        name: Some(name.to_string()),
        protocol: Some("TCP".to_string()),
        ..Default::default()
    }
}
