//! Notifier trait definition and shared error types.

use std::path::{Path, PathBuf};

/// Errors that can occur during notification delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} rejected: {description}")]
    Api { method: String, description: String },

    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
}

/// A rendered notification ready for delivery.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Notification {
    /// Short title, used in logs.
    pub subject: String,
    /// Rendered HTML body.
    pub body: String,
}

impl Notification {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Trait for delivery transports.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a text notification to `chat_id`.
    async fn send(&self, chat_id: i64, notification: &Notification) -> Result<(), NotifyError>;

    /// Upload the file at `path` to `chat_id`.
    async fn send_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> Result<(), NotifyError>;

    /// Human-readable name for this channel (e.g., "telegram").
    fn channel_name(&self) -> &str;
}

/// A slash command received from a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCommand {
    pub chat_id: i64,
    /// Command name without the leading `/` or a `@bot` suffix, lowercased.
    pub name: String,
}

/// Commands from one poll plus the offset acknowledging them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    pub commands: Vec<ChatCommand>,
    /// Offset for the next poll; `None` when nothing new arrived.
    pub next_offset: Option<i64>,
}

/// Source of bot commands (long-polled).
#[async_trait::async_trait]
pub trait CommandSource: Send + Sync {
    /// Register the command menu shown to chat members.
    async fn register_commands(&self, commands: &[(&str, &str)]) -> Result<(), NotifyError>;

    /// Wait for commands newer than `offset`.
    async fn poll_commands(&self, offset: Option<i64>) -> Result<CommandBatch, NotifyError>;
}

/// Result of dispatching a notification to a single channel.
#[derive(Debug)]
pub struct DispatchResult {
    pub channel: String,
    pub chat_id: i64,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}
