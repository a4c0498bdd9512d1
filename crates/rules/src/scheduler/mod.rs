//! Per-project cron scheduling of daily reports.
//!
//! Each project carries its own cron expression, evaluated in UTC. The
//! [`ReportScheduler`] remembers when each project last reported and tells
//! the report loop which projects are due on every tick.

mod core;
pub(crate) mod cron;
mod entry;


pub use self::core::{ReportScheduler, ScheduleError};
pub use self::cron::normalize_cron;
pub use self::entry::ReportScheduleEntry;
