//! Common utilities for Kubernetes resource generation

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements as K8sResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

use crate::crd::{ResourceList, ResourceRequirements};

/// API version of the operator's CRDs
pub const API_VERSION: &str = "database.mmontes.io/v1alpha1";

/// Operator field manager name for server-side apply
pub const FIELD_MANAGER: &str = "mariadb-operator";

/// Label carrying the owning MariaDB name
pub const CLUSTER_LABEL: &str = "database.mmontes.io/mariadb";

/// Generate a controller owner reference pointing at `owner`
///
/// Owned objects are garbage collected when the owner is deleted.
pub fn owner_reference<K>(owner: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: K::kind(&()).to_string(),
        name: owner.name_any(),
        uid: owner.meta().uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

/// Generate standard labels for all resources belonging to a MariaDB
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            "mariadb".to_string(),
        ),
        (
            "app.kubernetes.io/instance".to_string(),
            cluster_name.to_string(),
        ),
        (
            "app.kubernetes.io/managed-by".to_string(),
            FIELD_MANAGER.to_string(),
        ),
        (CLUSTER_LABEL.to_string(), cluster_name.to_string()),
    ])
}

/// Labels selecting the server pods of a MariaDB
pub fn selector_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "app.kubernetes.io/name".to_string(),
            "mariadb".to_string(),
        ),
        (CLUSTER_LABEL.to_string(), cluster_name.to_string()),
    ])
}

/// Convert CRD resource requirements into the Kubernetes type
pub fn to_k8s_resources(resources: Option<&ResourceRequirements>) -> Option<K8sResourceRequirements> {
    let resources = resources?;

    fn quantities(list: Option<&ResourceList>) -> Option<BTreeMap<String, Quantity>> {
        let list = list?;
        let mut map = BTreeMap::new();
        if let Some(cpu) = &list.cpu {
            map.insert("cpu".to_string(), Quantity(cpu.clone()));
        }
        if let Some(memory) = &list.memory {
            map.insert("memory".to_string(), Quantity(memory.clone()));
        }
        (!map.is_empty()).then_some(map)
    }

    Some(K8sResourceRequirements {
        limits: quantities(resources.limits.as_ref()),
        requests: quantities(resources.requests.as_ref()),
        ..Default::default()
    })
}
