//! Condition tracking for MariaDB and SqlJob status
//!
//! A `ConditionTracker` owns the condition list of a status object while a
//! reconcile pass decides what to write. It keeps at most one entry per type
//! and only moves `lastTransitionTime` when the status or reason changes, so
//! re-applying the same decision on every pass produces an identical list.

use chrono::{DateTime, Utc};

use crate::crd::{Condition, ConditionStatus, find_condition};

pub use crate::crd::{condition_reasons, condition_types};

/// In-memory condition set with transition bookkeeping
#[derive(Clone, Debug)]
pub struct ConditionTracker {
    conditions: Vec<Condition>,
    generation: Option<i64>,
    now: DateTime<Utc>,
}

impl ConditionTracker {
    /// Start from the conditions currently stored on the object, stamping
    /// transitions with `now`
    pub fn at(existing: Vec<Condition>, generation: Option<i64>, now: DateTime<Utc>) -> Self {
        let mut conditions: Vec<Condition> = Vec::with_capacity(existing.len());
        for condition in existing {
            // Collapse duplicates written by older clients, last one wins
            if let Some(slot) = conditions.iter_mut().find(|c| c.type_ == condition.type_) {
                *slot = condition;
            } else {
                conditions.push(condition);
            }
        }
        Self {
            conditions,
            generation,
            now,
        }
    }

    /// Set a condition, returning whether anything changed
    pub fn set(
        &mut self,
        type_: &str,
        status: ConditionStatus,
        reason: &str,
        message: &str,
    ) -> bool {
        let now = self.now.to_rfc3339();
        let generation = self.generation;

        let Some(existing) = self.conditions.iter_mut().find(|c| c.type_ == type_) else {
            self.conditions.push(Condition {
                type_: type_.to_string(),
                status,
                reason: reason.to_string(),
                message: message.to_string(),
                last_transition_time: now,
                observed_generation: generation,
            });
            return true;
        };

        let transitioned = existing.status != status || existing.reason != reason;
        let changed = transitioned
            || existing.message != message
            || existing.observed_generation != generation;

        if transitioned {
            existing.status = status;
            existing.reason = reason.to_string();
            existing.last_transition_time = now;
        }
        existing.message = message.to_string();
        existing.observed_generation = generation;

        changed
    }

    pub fn set_true(&mut self, type_: &str, reason: &str, message: &str) -> bool {
        self.set(type_, ConditionStatus::True, reason, message)
    }

    pub fn set_false(&mut self, type_: &str, reason: &str, message: &str) -> bool {
        self.set(type_, ConditionStatus::False, reason, message)
    }

    pub fn get(&self, type_: &str) -> Option<&Condition> {
        find_condition(&self.conditions, type_)
    }

    /// Absent, False and Unknown are all not true
    pub fn is_true(&self, type_: &str) -> bool {
        self.get(type_)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn into_conditions(self) -> Vec<Condition> {
        self.conditions
    }
}
