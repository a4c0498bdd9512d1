//! Delivers notifications to every configured channel.
//!
//! Each failure is logged and reported back; nothing is retried and one
//! failing channel never blocks the others.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::traits::{DispatchResult, Notification, Notifier, NotifyError};

pub struct Dispatcher {
    channels: Vec<Arc<dyn Notifier>>,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn Notifier>>) -> Self {
        Self { channels }
    }

    pub fn single(channel: Arc<dyn Notifier>) -> Self {
        Self::new(vec![channel])
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send `notification` to `chat_id` on every channel.
    pub async fn dispatch(
        &self,
        chat_id: i64,
        notification: &Notification,
    ) -> Vec<DispatchResult> {
        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let start = Instant::now();
            let result = channel.send(chat_id, notification).await;
            let subject = notification.subject.as_str();
            results.push(self.record(channel.as_ref(), chat_id, subject, start, result));
        }
        results
    }

    /// Upload the file at `path` to `chat_id` on every channel.
    pub async fn dispatch_document(
        &self,
        chat_id: i64,
        path: &Path,
        caption: Option<&str>,
    ) -> Vec<DispatchResult> {
        let subject = path.display().to_string();
        let mut results = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            let start = Instant::now();
            let result = channel.send_document(chat_id, path, caption).await;
            results.push(self.record(channel.as_ref(), chat_id, &subject, start, result));
        }
        results
    }

    fn record(
        &self,
        channel: &dyn Notifier,
        chat_id: i64,
        subject: &str,
        start: Instant,
        result: Result<(), NotifyError>,
    ) -> DispatchResult {
        let duration_ms = start.elapsed().as_millis() as u64;
        let (success, error) = match result {
            Ok(()) => {
                tracing::info!(
                    chat_id,
                    channel = channel.channel_name(),
                    subject,
                    duration_ms,
                    "Notification delivered"
                );
                (true, None)
            }
            Err(e) => {
                tracing::warn!(
                    chat_id,
                    channel = channel.channel_name(),
                    subject,
                    error = %e,
                    duration_ms,
                    "Notification delivery failed"
                );
                (false, Some(e.to_string()))
            }
        };
        DispatchResult {
            channel: channel.channel_name().to_string(),
            chat_id,
            success,
            error,
            duration_ms,
        }
    }
}
