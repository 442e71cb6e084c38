//! SQL source policy
//!
//! A SqlJob is created with exactly one of `sql` and `sqlConfigMapKeyRef`.
//! Updates may set both (switching source) but never clear both.

use super::{ValidationContext, ValidationResult};

pub fn validate_sql_source(ctx: &ValidationContext) -> ValidationResult {
    let spec = &ctx.sql_job.spec;
    let inline = spec.sql.is_some();
    let referenced = spec.sql_config_map_key_ref.is_some();

    if !inline && !referenced {
        return ValidationResult::denied(
            "spec.sql",
            "SqlSourceMissing",
            "either sql or sqlConfigMapKeyRef must be set",
        );
    }

    if ctx.is_create() && inline && referenced {
        return ValidationResult::denied(
            "spec.sql",
            "SqlSourceConflict",
            "only one of sql and sqlConfigMapKeyRef may be set",
        );
    }

    ValidationResult::allowed()
}
