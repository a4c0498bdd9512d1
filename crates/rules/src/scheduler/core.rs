//! [`ReportScheduler`]: scheduling state for every project's report.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use thiserror::Error;
use tracing::debug;

use super::cron::{is_cron_due, normalize_cron};
use super::entry::ReportScheduleEntry;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("project '{project}': invalid report schedule '{expression}': {source}")]
    InvalidCron {
        project: String,
        expression: String,
        #[source]
        source: cron::error::Error,
    },
}

/// Tracks the report schedule of every project.
///
/// Register all projects at startup, then call
/// [`due_projects`](ReportScheduler::due_projects) from the report loop and
/// [`record_trigger_at`](ReportScheduler::record_trigger_at) after each
/// report was flushed.
#[derive(Debug, Default)]
pub struct ReportScheduler {
    entries: BTreeMap<String, ReportScheduleEntry>,
}

impl ReportScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register `project`'s schedule. Ticks at or before `now`
    /// are treated as already handled, so nothing fires at startup.
    pub fn register(
        &mut self,
        project: &str,
        expression: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ScheduleError> {
        let cron_expression = normalize_cron(expression);
        let schedule =
            Schedule::from_str(&cron_expression).map_err(|source| ScheduleError::InvalidCron {
                project: project.to_string(),
                expression: expression.to_string(),
                source,
            })?;

        debug!(
            project = %project,
            cron = %cron_expression,
            next = ?schedule.after(&now).next(),
            "registered report schedule"
        );

        self.entries.insert(
            project.to_string(),
            ReportScheduleEntry {
                project: project.to_string(),
                cron_expression,
                schedule,
                last_triggered: now,
            },
        );
        Ok(())
    }

    /// Whether `project`'s report should fire at `now`.
    pub fn should_run(&self, project: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(project)
            .is_some_and(|entry| is_cron_due(&entry.schedule, now, entry.last_triggered))
    }

    /// Projects whose report is due at `now`, in name order.
    pub fn due_projects(&self, now: DateTime<Utc>) -> Vec<&str> {
        self.entries
            .values()
            .filter(|entry| is_cron_due(&entry.schedule, now, entry.last_triggered))
            .map(|entry| entry.project.as_str())
            .collect()
    }

    /// Record that `project`'s report fired at `at`.
    pub fn record_trigger_at(&mut self, project: &str, at: DateTime<Utc>) {
        if let Some(entry) = self.entries.get_mut(project) {
            entry.last_triggered = at;
        }
    }

    /// Next firing strictly after the last trigger.
    pub fn next_fire(&self, project: &str) -> Option<DateTime<Utc>> {
        let entry = self.entries.get(project)?;
        entry.schedule.after(&entry.last_triggered).next()
    }

    pub fn get(&self, project: &str) -> Option<&ReportScheduleEntry> {
        self.entries.get(project)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
