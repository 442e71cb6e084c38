//! Cron schedule policy

use super::{ValidationContext, ValidationResult};
use crate::cron::CronSchedule;

/// Reject a schedule whose cron expression does not parse
pub fn validate_schedule(ctx: &ValidationContext) -> ValidationResult {
    let Some(schedule) = &ctx.sql_job.spec.schedule else {
        return ValidationResult::allowed();
    };

    match CronSchedule::parse(&schedule.cron) {
        Ok(_) => ValidationResult::allowed(),
        Err(e) => ValidationResult::denied(
            "spec.schedule.cron",
            "InvalidSchedule",
            &format!("invalid cron expression {:?}: {}", schedule.cron, e),
        ),
    }
}
