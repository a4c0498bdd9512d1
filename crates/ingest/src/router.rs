//! Fan-in of every project's events into a single bounded stream.
//!
//! Producers (one task per project) suspend when the channel is full, so
//! nothing is dropped under load. Events from one project arrive in file
//! order. The stream ends once every sender is gone, which is how the
//! consumer drains in-flight events during shutdown.

use std::sync::Arc;
use std::time::Duration;

use logwarden_core::{Event, Shutdown};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::enrich::EnrichmentStage;
use crate::parser::LineParser;
use crate::tail::TailSource;

/// Pause after a read error before touching the file again.
const READ_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Create a router with room for `capacity` in-flight events.
pub fn channel(capacity: usize) -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender { tx }, EventStream { rx })
}

#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Event>,
}

impl EventSender {
    /// Waits for capacity. Gives the event back if the stream was dropped.
    pub async fn send(&self, event: Event) -> Result<(), Event> {
        self.tx.send(event).await.map_err(|e| e.0)
    }
}

#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<Event>,
}

impl EventStream {
    /// `None` once all senders were dropped and the buffer is empty.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Spawn the ingest task for one project: tail → parse → enrich → send.
///
/// The task ends when `shutdown` fires or the stream is gone, dropping its
/// sender on the way out.
pub fn spawn_project(
    mut tail: TailSource,
    parser: LineParser,
    stage: Arc<EnrichmentStage>,
    sender: EventSender,
    mut shutdown: Shutdown,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let project = parser.project().to_string();
        let mut routed: u64 = 0;
        let mut rejected: u64 = 0;

        loop {
            let line = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                line = tail.next_line() => line,
            };

            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(project = %project, error = %e, "log read failed, retrying");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(READ_RETRY_DELAY) => continue,
                    }
                }
            };

            let event = match parser.parse(&line) {
                Ok(event) => event,
                Err(rejection) => {
                    rejected += 1;
                    if !rejection.is_noise() {
                        debug!(
                            project = %project,
                            reason = %rejection,
                            line = %line,
                            "skipping unparseable line"
                        );
                    }
                    continue;
                }
            };

            let event = stage.apply(event).await;
            if sender.send(event).await.is_err() {
                warn!(project = %project, "event stream closed, stopping ingest");
                break;
            }
            routed += 1;
        }

        info!(project = %project, routed, rejected, "ingest task stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use logwarden_core::{Enrichment, Request};

    fn event(project: &str, status: u16) -> Event {
        Event {
            project: project.into(),
            remote_addr: "127.0.0.1".into(),
            remote_user: None,
            time_local: String::new(),
            timestamp: None,
            request: "GET / HTTP/1.1".into(),
            parsed: Request {
                method: "GET".into(),
                uri: "/".into(),
                protocol: "HTTP/1.1".into(),
            },
            status,
            body_bytes_sent: 0,
            referer: "-".into(),
            user_agent: "-".into(),
            enrichment: Enrichment::default(),
        }
    }

    #[tokio::test]
    async fn preserves_per_sender_order() {
        let (tx, mut rx) = channel(16);
        for status in [200, 201, 202] {
            tx.send(event("a", status)).await.unwrap();
        }
        drop(tx);

        let mut seen = Vec::new();
        while let Some(e) = rx.next().await {
            seen.push(e.status);
        }
        assert_eq!(seen, vec![200, 201, 202]);
    }

    #[tokio::test]
    async fn full_channel_applies_backpressure_without_dropping() {
        let (tx, mut rx) = channel(1);
        tx.send(event("a", 200)).await.unwrap();

        let producer = {
            let tx = tx.clone();
            tokio::spawn(async move { tx.send(event("a", 500)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished(), "second send waits for room");

        assert_eq!(rx.next().await.unwrap().status, 200);
        producer.await.unwrap().unwrap();
        assert_eq!(rx.next().await.unwrap().status, 500);
    }

    #[tokio::test]
    async fn send_fails_after_stream_dropped() {
        let (tx, rx) = channel(4);
        drop(rx);
        let returned = tx.send(event("a", 200)).await.unwrap_err();
        assert_eq!(returned.status, 200);
    }
}
