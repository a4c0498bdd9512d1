//! Per-project schedule entry type.

use chrono::{DateTime, Utc};
use cron::Schedule;

/// Scheduling state for a single project's report.
#[derive(Debug, Clone)]
pub struct ReportScheduleEntry {
    /// Project name (key of `Config::projects`).
    pub project: String,
    /// Normalized 6-field cron expression (seconds prepended).
    pub cron_expression: String,
    /// Parsed form of `cron_expression`.
    pub schedule: Schedule,
    /// Last time the report fired; registration time before the first one.
    pub last_triggered: DateTime<Utc>,
}
