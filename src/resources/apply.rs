//! Create-or-update for objects owned by a MariaDB
//!
//! The live object is left untouched when the desired object is a structural
//! subset of it. Fields defaulted by the API server or other controllers do
//! not count as drift.

use serde_json::Value;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::controller::store::{ResourceStore, SubResource};

/// Attempts before a conflicting write is surfaced as an error
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// Ensure the live object matches `desired`, returning whether a write happened
pub async fn reconcile_resource(store: &dyn ResourceStore, desired: &SubResource) -> Result<bool> {
    let kind = desired.kind();
    let namespace = desired.namespace();
    let name = desired.name();
    let desired_value = desired.to_value()?;

    for attempt in 1..=MAX_CONFLICT_RETRIES {
        let live = store.get_resource(kind, &namespace, &name).await?;

        let write = match live {
            None => store.create_resource(desired).await,
            Some(live) => {
                if json_subset(&desired_value, &live.to_value()?) {
                    debug!(%kind, %namespace, %name, "Resource up to date");
                    return Ok(false);
                }
                let precondition = live.resource_version().map(str::to_string);
                store
                    .apply_resource(&desired.clone().with_resource_version(precondition))
                    .await
            }
        };

        match write {
            Ok(()) => {
                info!(%kind, %namespace, %name, "Reconciled resource");
                return Ok(true);
            }
            Err(e) if e.is_conflict() => {
                debug!(%kind, %namespace, %name, attempt, "Conflict writing resource, re-reading");
            }
            Err(e) => return Err(e),
        }
    }

    Err(Error::ConflictError(format!(
        "{kind} {namespace}/{name} kept changing after {MAX_CONFLICT_RETRIES} attempts"
    )))
}

/// Whether every field set in `desired` has the same value in `live`
///
/// Objects match key by key, arrays element by element with equal length,
/// and a null in `desired` matches a missing or null field.
pub fn json_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Null, _) => true,
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(key, dv)| match l.get(key) {
            Some(lv) => json_subset(dv, lv),
            None => dv.is_null(),
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(dv, lv)| json_subset(dv, lv))
        }
        (d, l) => d == l,
    }
}
