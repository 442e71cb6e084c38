//! Admission webhook policies
//!
//! Each policy module exports a `validate` function that checks specific rules.
//! A policy sees the incoming object and, on UPDATE, the stored one.

pub mod immutability;
pub mod mariadb;
pub mod schedule;
pub mod sql_source;

pub use immutability::validate_immutability;
pub use mariadb::validate_mariadb;
pub use schedule::validate_schedule;
pub use sql_source::validate_sql_source;

use crate::crd::SqlJob;

/// Result of a policy validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub allowed: bool,
    /// JSON path of the offending field, e.g. `spec.dependsOn`
    pub field: Option<String>,
    pub reason: Option<String>,
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            field: None,
            reason: None,
            message: None,
        }
    }

    pub fn denied(field: &str, reason: &str, message: &str) -> Self {
        Self {
            allowed: false,
            field: Some(field.to_string()),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
        }
    }

    /// Message qualified with the field, as returned to the API server
    pub fn qualified_message(&self) -> String {
        match (&self.field, &self.message) {
            (Some(field), Some(message)) => format!("{}: {}", field, message),
            (None, Some(message)) => message.clone(),
            (Some(field), None) => format!("{}: invalid value", field),
            (None, None) => "Validation failed".to_string(),
        }
    }
}

/// Context for validation including old object for UPDATE operations
pub struct ValidationContext<'a> {
    pub sql_job: &'a SqlJob,
    pub old_sql_job: Option<&'a SqlJob>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(sql_job: &'a SqlJob, old_sql_job: Option<&'a SqlJob>) -> Self {
        Self {
            sql_job,
            old_sql_job,
        }
    }

    /// Check if this is a CREATE operation (no old object)
    pub fn is_create(&self) -> bool {
        self.old_sql_job.is_none()
    }
}

/// Validate a SqlJob on CREATE (`old` is None) or UPDATE
///
/// Returns the first failure. An update that leaves the spec untouched is
/// always allowed so that status and metadata writes never get stuck.
pub fn validate_sql_job(new: &SqlJob, old: Option<&SqlJob>) -> ValidationResult {
    if let Some(old) = old
        && old.spec == new.spec
    {
        return ValidationResult::allowed();
    }

    let ctx = ValidationContext::new(new, old);
    let policies: Vec<fn(&ValidationContext) -> ValidationResult> = vec![
        validate_sql_source,
        validate_schedule,
        validate_immutability,
    ];

    for policy in policies {
        let result = policy(&ctx);
        if !result.allowed {
            return result;
        }
    }

    ValidationResult::allowed()
}
