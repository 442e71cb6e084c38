//! MariaDB admission policy
//!
//! Thin adapter over the spec validation shared with the controller.

use super::ValidationResult;
use crate::controller::Error;
use crate::controller::validation::{validate_spec, validate_spec_change};
use crate::crd::MariaDB;

/// Validate a MariaDB on CREATE (`old` is None) or UPDATE
pub fn validate_mariadb(new: &MariaDB, old: Option<&MariaDB>) -> ValidationResult {
    let result = validate_spec(new).and_then(|()| match old {
        Some(old) => validate_spec_change(old, new),
        None => Ok(()),
    });

    match result {
        Ok(()) => ValidationResult::allowed(),
        Err(Error::ValidationError(msg)) => {
            // Messages are "<field>: <detail>"
            let (field, detail) = msg.split_once(": ").unwrap_or(("spec", msg.as_str()));
            ValidationResult::denied(field, "InvalidSpec", detail)
        }
        Err(e) => ValidationResult::denied("spec", "InvalidSpec", &e.to_string()),
    }
}
