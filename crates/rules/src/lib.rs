//! Event consumers: daily aggregation, live alert evaluation and the cron
//! schedule that decides when each project's report is flushed.

pub mod aggregator;
pub mod alert;
pub mod report;
pub mod scheduler;

pub use aggregator::{DailyAggregator, DailyEntry};
pub use alert::{AlertPolicy, Severity};
pub use report::ReportSummary;
pub use scheduler::{ReportScheduler, ScheduleError};
