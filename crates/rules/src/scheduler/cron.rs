//! Cron normalization and due-check helpers.

use chrono::{DateTime, Utc};
use cron::Schedule;

/// Normalize a 5-field cron expression to 6-field by prepending "0 " for seconds.
///
/// The `cron` crate requires 6 fields: `sec min hour day-of-month month day-of-week`.
/// Config files use standard 5-field cron: `min hour day-of-month month day-of-week`.
pub fn normalize_cron(expr: &str) -> String {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        // Already 6-field (or 7 with year); pass through.
        trimmed.to_string()
    }
}

/// A schedule is due when one of its ticks falls in `(last_run, now]`.
///
/// Several ticks missed in one gap still count as a single firing.
pub(crate) fn is_cron_due(
    schedule: &Schedule,
    now: DateTime<Utc>,
    last_run: DateTime<Utc>,
) -> bool {
    match schedule.after(&last_run).next() {
        Some(next) => next <= now,
        None => false,
    }
}
