//! Event consumer: records every event for the daily report and pushes
//! live alerts inline.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use logwarden_core::Event;
use logwarden_ingest::EventStream;
use logwarden_notify::{Dispatcher, Notification, TemplateRenderer};
use logwarden_rules::{AlertPolicy, DailyAggregator, Severity};
use tracing::{debug, info, warn};

/// Counters reported when the consumer stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub events: u64,
    pub recorded: u64,
    pub alerts: u64,
}

pub struct Pipeline {
    aggregator: Arc<DailyAggregator>,
    policy: AlertPolicy,
    started_at: DateTime<Utc>,
    renderer: Arc<TemplateRenderer>,
    dispatcher: Arc<Dispatcher>,
    /// Project → destination chat.
    chats: Arc<HashMap<String, i64>>,
}

impl Pipeline {
    pub fn new(
        aggregator: Arc<DailyAggregator>,
        policy: AlertPolicy,
        started_at: DateTime<Utc>,
        renderer: Arc<TemplateRenderer>,
        dispatcher: Arc<Dispatcher>,
        chats: Arc<HashMap<String, i64>>,
    ) -> Self {
        Self {
            aggregator,
            policy,
            started_at,
            renderer,
            dispatcher,
            chats,
        }
    }

    /// Consume the stream until every producer is gone.
    pub async fn run(self, mut stream: EventStream) -> PipelineStats {
        let mut stats = PipelineStats::default();
        while let Some(event) = stream.next().await {
            stats.events += 1;
            let (recorded, alerted) = self.handle(&event).await;
            stats.recorded += u64::from(recorded);
            stats.alerts += u64::from(alerted);
        }
        info!(
            events = stats.events,
            recorded = stats.recorded,
            alerts = stats.alerts,
            "event stream drained"
        );
        stats
    }

    /// Record `event` and alert on it if the policy says so. Returns
    /// `(recorded, alert_sent)`.
    pub async fn handle(&self, event: &Event) -> (bool, bool) {
        let recorded = self.aggregator.record(event);
        if !self.policy.should_alert(event, self.started_at) {
            return (recorded, false);
        }
        (recorded, self.alert(event).await)
    }

    async fn alert(&self, event: &Event) -> bool {
        let Some(&chat_id) = self.chats.get(&event.project) else {
            debug!(project = %event.project, "no chat configured, alert dropped");
            return false;
        };

        let body = match self.renderer.render_alert(event, Severity::of(event.status)) {
            Ok(body) => body,
            Err(e) => {
                warn!(project = %event.project, error = %e, "cannot render alert");
                return false;
            }
        };
        let subject = format!("{} {}", event.status, event.parsed.uri);
        let notification = Notification::new(subject, body);

        let results = self.dispatcher.dispatch(chat_id, &notification).await;
        results.iter().any(|r| r.success)
    }
}
