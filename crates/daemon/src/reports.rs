//! Report loop: ticks the cron scheduler and flushes due projects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use logwarden_core::Shutdown;
use logwarden_notify::templating::format_rfc1123;
use logwarden_notify::{Dispatcher, Notification, TemplateRenderer};
use logwarden_rules::{DailyAggregator, ReportScheduler};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct ReportLoop {
    scheduler: ReportScheduler,
    aggregator: Arc<DailyAggregator>,
    renderer: Arc<TemplateRenderer>,
    dispatcher: Arc<Dispatcher>,
    chats: Arc<HashMap<String, i64>>,
    tick: Duration,
}

impl ReportLoop {
    pub fn new(
        scheduler: ReportScheduler,
        aggregator: Arc<DailyAggregator>,
        renderer: Arc<TemplateRenderer>,
        dispatcher: Arc<Dispatcher>,
        chats: Arc<HashMap<String, i64>>,
        tick: Duration,
    ) -> Self {
        Self {
            scheduler,
            aggregator,
            renderer,
            dispatcher,
            chats,
            tick,
        }
    }

    pub async fn run(mut self, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.flush_due(Utc::now()).await;
                }
            }
        }
        debug!("report loop stopped");
    }

    /// Flush every project whose schedule fired by `now`. Returns the
    /// flushed project names.
    pub async fn flush_due(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let due: Vec<String> = self
            .scheduler
            .due_projects(now)
            .into_iter()
            .map(str::to_string)
            .collect();

        for project in &due {
            self.scheduler.record_trigger_at(project, now);
            self.flush(project, now).await;
        }
        due
    }

    /// Drain `project`'s bucket and send its report.
    pub async fn flush(&self, project: &str, now: DateTime<Utc>) {
        let summary = self.aggregator.drain(project);
        let window = format_rfc1123(&now.with_timezone(&Local));

        let Some(&chat_id) = self.chats.get(project) else {
            warn!(project, "no chat configured, report dropped");
            return;
        };

        let body = match self.renderer.render_report(&summary, project, &window) {
            Ok(body) => body,
            Err(e) => {
                warn!(project, error = %e, "cannot render report");
                return;
            }
        };

        info!(
            project,
            total = summary.total,
            errors_5xx = summary.class_5xx,
            "sending daily report"
        );
        let notification = Notification::new(format!("report {project}"), body);
        self.dispatcher.dispatch(chat_id, &notification).await;
    }
}
