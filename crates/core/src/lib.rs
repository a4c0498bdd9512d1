pub mod config;
pub mod error;
pub mod event;
pub mod shutdown;

pub use config::{Config, ProjectConfig};
pub use error::*;
pub use event::*;
pub use shutdown::{Shutdown, ShutdownTrigger};
