//! Webhook HTTP server handlers
//!
//! Implements the ValidatingAdmissionWebhook HTTP endpoints for MariaDB and
//! SqlJob resources.

use axum::{Json, Router, routing::post};
use kube::Resource;
use kube::core::DynamicObject;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info, warn};

use super::policies::{ValidationResult, validate_mariadb, validate_sql_job};
use crate::crd::{MariaDB, SqlJob};

/// Create the webhook router
pub fn create_webhook_router() -> Router {
    Router::new()
        .route("/validate-mariadb", post(validate_mariadb_handler))
        .route("/validate-sqljob", post(validate_sql_job_handler))
}

async fn validate_mariadb_handler(
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(admit::<MariaDB>(review, "MariaDB", validate_mariadb).into_review())
}

async fn validate_sql_job_handler(
    Json(review): Json<AdmissionReview<DynamicObject>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(admit::<SqlJob>(review, "SqlJob", validate_sql_job).into_review())
}

/// Decode the review, run `validate` and build the response
///
/// An UPDATE is only validated against a decodable old object. Anything that
/// cannot be decoded is denied.
pub(crate) fn admit<K: Resource + DeserializeOwned>(
    review: AdmissionReview<DynamicObject>,
    kind: &str,
    validate: fn(&K, Option<&K>) -> ValidationResult,
) -> AdmissionResponse {
    let request: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, kind, "Admission review missing request");
            return AdmissionResponse::invalid(e);
        }
    };

    info!(
        uid = %request.uid,
        kind,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = %request.name,
        "Processing admission request"
    );

    if request.operation == Operation::Delete {
        return AdmissionResponse::from(&request);
    }

    let object: K = match request.object.clone().map(DynamicObject::try_parse::<K>) {
        Some(Ok(object)) => object,
        Some(Err(e)) => {
            let result = ValidationResult::denied(
                "object",
                "InvalidObject",
                &format!("failed to parse {kind}: {e}"),
            );
            return deny(&request, &result);
        }
        None => {
            let result = ValidationResult::denied("object", "InvalidObject", "missing from request");
            return deny(&request, &result);
        }
    };

    let old_object: Option<K> = if request.operation == Operation::Update {
        match request.old_object.clone().map(DynamicObject::try_parse::<K>) {
            Some(Ok(old)) => Some(old),
            Some(Err(e)) => {
                let result = ValidationResult::denied(
                    "oldObject",
                    "InvalidObject",
                    &format!("failed to parse {kind}: {e}"),
                );
                return deny(&request, &result);
            }
            None => {
                let result =
                    ValidationResult::denied("oldObject", "InvalidObject", "missing from UPDATE");
                return deny(&request, &result);
            }
        }
    } else {
        None
    };

    let result = validate(&object, old_object.as_ref());
    if !result.allowed {
        return deny(&request, &result);
    }

    info!(uid = %request.uid, "Admission request allowed");
    AdmissionResponse::from(&request)
}

/// Denied response carrying the field-qualified message and a 403 status
fn deny(request: &AdmissionRequest<DynamicObject>, result: &ValidationResult) -> AdmissionResponse {
    let reason = result
        .reason
        .clone()
        .unwrap_or_else(|| "ValidationFailed".to_string());
    let message = result.qualified_message();
    warn!(uid = %request.uid, reason = %reason, message = %message, "Admission request denied");

    let mut response = AdmissionResponse::from(request).deny(message);
    response.result.code = 403;
    response.result.reason = reason;
    response
}

/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 8443;

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:8443. Certificates are PEM files.
pub async fn run_webhook_server(cert_path: &str, key_path: &str) -> Result<(), WebhookError> {
    use axum_server::tls_rustls::RustlsConfig;
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let app = create_webhook_router();

    let config = RustlsConfig::from_pem_file(PathBuf::from(cert_path), PathBuf::from(key_path))
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!("Webhook server listening on {} with TLS", addr);

    axum_server::bind_rustls(addr, config)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}

/// Errors that can occur when running the webhook server
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Webhook server error: {0}")]
    Server(String),
}
