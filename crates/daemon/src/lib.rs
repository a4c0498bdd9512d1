//! Daemon wiring: startup validation, the event consumer, the report loop,
//! the chat command listener and signal-driven shutdown.

pub mod app;
pub mod commands;
pub mod pipeline;
pub mod reports;
pub mod signal;

pub use app::{Daemon, RuntimeOptions, StartupError};
pub use pipeline::{Pipeline, PipelineStats};
