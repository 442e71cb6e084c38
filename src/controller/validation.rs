//! Validation logic for MariaDB specs
//!
//! Used by the admission webhook before a MariaDB is persisted.

use crate::controller::error::{Error, Result};
use crate::crd::MariaDB;

/// Minimum number of replicas
pub const MIN_REPLICAS: i32 = 1;

/// Maximum number of replicas (arbitrary limit for safety)
pub const MAX_REPLICAS: i32 = 100;

/// Validate the cluster spec
pub fn validate_spec(mariadb: &MariaDB) -> Result<()> {
    validate_replicas(mariadb)?;
    validate_storage(mariadb)?;
    validate_galera(mariadb)?;
    Ok(())
}

/// Validate replica count
fn validate_replicas(mariadb: &MariaDB) -> Result<()> {
    let replicas = mariadb.spec.replicas;

    if replicas < MIN_REPLICAS {
        return Err(Error::ValidationError(format!(
            "spec.replicas: replica count {} is below minimum {}",
            replicas, MIN_REPLICAS
        )));
    }

    if replicas > MAX_REPLICAS {
        return Err(Error::ValidationError(format!(
            "spec.replicas: replica count {} exceeds maximum {}",
            replicas, MAX_REPLICAS
        )));
    }

    Ok(())
}

/// Validate storage configuration
fn validate_storage(mariadb: &MariaDB) -> Result<()> {
    let size = &mariadb.spec.storage.size;

    if !size.ends_with("Gi") && !size.ends_with("Mi") && !size.ends_with("Ti") {
        return Err(Error::ValidationError(format!(
            "spec.storage.size: must end with Gi, Mi, or Ti: {}",
            size
        )));
    }

    let num_str = size.trim_end_matches(char::is_alphabetic);
    let _num: u64 = num_str.parse().map_err(|_| {
        Error::ValidationError(format!("spec.storage.size: invalid number: {}", size))
    })?;

    Ok(())
}

fn validate_galera(mariadb: &MariaDB) -> Result<()> {
    let Some(galera) = &mariadb.spec.galera else {
        return Ok(());
    };

    if !(1..=i32::from(u16::MAX)).contains(&galera.agent.port) {
        return Err(Error::ValidationError(format!(
            "spec.galera.agent.port: {} is not a valid port",
            galera.agent.port
        )));
    }

    if galera.sst.trim().is_empty() {
        return Err(Error::ValidationError(
            "spec.galera.sst: must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validate changes between the stored and the incoming spec
pub fn validate_spec_change(old: &MariaDB, new: &MariaDB) -> Result<()> {
    if old.spec.storage.class_name != new.spec.storage.class_name {
        return Err(Error::ValidationError(
            "spec.storage.className: storage class cannot be changed after creation".to_string(),
        ));
    }

    Ok(())
}
