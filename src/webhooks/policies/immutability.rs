//! Immutability policies
//!
//! Fields that identify what a SqlJob runs and against which server cannot
//! change after creation. The schedule, the ConfigMap source and the backoff
//! limit stay mutable.

use super::{ValidationContext, ValidationResult};
use crate::crd::SqlJobSpec;

/// Validate immutable fields on UPDATE
pub fn validate_immutability(ctx: &ValidationContext) -> ValidationResult {
    // Only apply immutability checks on UPDATE, not CREATE
    let Some(old_job) = ctx.old_sql_job else {
        return ValidationResult::allowed();
    };

    match changed_immutable_field(&old_job.spec, &ctx.sql_job.spec) {
        Some(field) => ValidationResult::denied(
            field,
            "FieldImmutable",
            "field is immutable. Delete and recreate the SqlJob to change it.",
        ),
        None => ValidationResult::allowed(),
    }
}

/// First immutable field that differs between `old` and `new`
pub fn changed_immutable_field(old: &SqlJobSpec, new: &SqlJobSpec) -> Option<&'static str> {
    if old.depends_on != new.depends_on {
        return Some("spec.dependsOn");
    }
    if old.maria_db_ref != new.maria_db_ref {
        return Some("spec.mariaDbRef");
    }
    if old.username != new.username {
        return Some("spec.username");
    }
    if old.password_secret_key_ref != new.password_secret_key_ref {
        return Some("spec.passwordSecretKeyRef");
    }
    if old.database != new.database {
        return Some("spec.database");
    }
    if old.sql != new.sql {
        return Some("spec.sql");
    }
    if old.restart_policy != new.restart_policy {
        return Some("spec.restartPolicy");
    }
    if old.resources != new.resources {
        return Some("spec.resources");
    }
    None
}
