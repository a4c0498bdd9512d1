//! Delivery of alerts, reports and exports to chat.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable delivery transports
//! - `CommandSource` trait for reading bot commands back from chat
//! - Telegram Bot API implementation of both
//! - Minijinja rendering of alert and report messages
//! - Dispatcher that delivers to every channel and logs failures

pub mod dispatcher;
pub mod telegram;
pub mod templating;
pub mod traits;

pub use dispatcher::Dispatcher;
pub use telegram::TelegramNotifier;
pub use templating::TemplateRenderer;
pub use traits::{
    ChatCommand, CommandBatch, CommandSource, DispatchResult, Notification, Notifier, NotifyError,
};
