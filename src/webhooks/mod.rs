//! Admission webhooks for MariaDB and SqlJob validation
//!
//! Rejects invalid objects before they are persisted to etcd. Every denial
//! names the offending field.

pub mod policies;
mod server;

pub use policies::{ValidationContext, ValidationResult, validate_mariadb, validate_sql_job};
pub use server::{
    WEBHOOK_CERT_PATH, WEBHOOK_KEY_PATH, WEBHOOK_PORT, WebhookError, create_webhook_router,
    run_webhook_server,
};

pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
