//! Startup validation and task wiring.
//!
//! [`Daemon::prepare`] does everything that may fail fatally: pattern
//! compilation, cron parsing, enrichment tables and opening every log.
//! [`Daemon::run`] then spawns the tasks and supervises shutdown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use logwarden_core::{Config, ConfigError, Shutdown};
use logwarden_ingest::{
    router, CompiledPattern, EnrichError, EnrichmentStage, LineParser, PatternError, TailError,
    TailSource,
};
use logwarden_notify::{CommandSource, Dispatcher, Notifier, TemplateRenderer};
use logwarden_rules::{AlertPolicy, DailyAggregator, ReportScheduler, ScheduleError};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commands::{CommandListener, ExportTarget};
use crate::pipeline::{Pipeline, PipelineStats};
use crate::reports::ReportLoop;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("project '{project}': {source}")]
    Pattern {
        project: String,
        #[source]
        source: PatternError,
    },

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("project '{project}': {source}")]
    Tail {
        project: String,
        #[source]
        source: TailError,
    },

    #[error(transparent)]
    Enrichment(#[from] EnrichError),
}

/// Knobs that come from the command line rather than the config file.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub channel_capacity: usize,
    /// How often the report loop checks the cron schedules.
    pub tick_interval: Duration,
    /// Fallback poll for the tail sources.
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
    pub export_dir: PathBuf,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            tick_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(10),
            export_dir: std::env::temp_dir(),
        }
    }
}

struct ProjectRuntime {
    parser: LineParser,
    tail: TailSource,
    log: PathBuf,
    chat_id: i64,
}

/// A validated daemon, ready to run.
pub struct Daemon {
    options: RuntimeOptions,
    started_at: DateTime<Utc>,
    policy: AlertPolicy,
    stage: Arc<EnrichmentStage>,
    scheduler: ReportScheduler,
    aggregator: Arc<DailyAggregator>,
    projects: Vec<ProjectRuntime>,
}

impl Daemon {
    /// Validate `config` and open every log. Any error here is fatal.
    pub async fn prepare(config: &Config, options: RuntimeOptions) -> Result<Self, StartupError> {
        config.validate()?;
        let started_at = Utc::now();

        let stage = Arc::new(EnrichmentStage::from_settings(&config.enrichment)?);
        let mut scheduler = ReportScheduler::new();
        let mut projects = Vec::with_capacity(config.projects.len());

        for (name, project) in &config.projects {
            let pattern = CompiledPattern::compile(&project.format).map_err(|source| {
                StartupError::Pattern {
                    project: name.clone(),
                    source,
                }
            })?;
            scheduler.register(name, &project.report_schedule, started_at)?;

            let tail = TailSource::open(&project.log, options.poll_interval)
                .await
                .map_err(|source| StartupError::Tail {
                    project: name.clone(),
                    source,
                })?;

            info!(
                project = %name,
                log = %project.log.display(),
                next_report = ?scheduler.next_fire(name),
                "project ready"
            );
            projects.push(ProjectRuntime {
                parser: LineParser::new(name.clone(), project.host.clone(), Arc::new(pattern)),
                tail,
                log: project.log.clone(),
                chat_id: project.chat_id,
            });
        }

        Ok(Self {
            aggregator: Arc::new(DailyAggregator::new(config.projects.keys())),
            policy: AlertPolicy::from(&config.alerts),
            options,
            started_at,
            stage,
            scheduler,
            projects,
        })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn aggregator(&self) -> Arc<DailyAggregator> {
        Arc::clone(&self.aggregator)
    }

    /// Run until `shutdown` fires, then stop the tails, drain the channel
    /// and join every task within the shutdown timeout.
    pub async fn run(
        self,
        notifier: Arc<dyn Notifier>,
        commands: Option<Arc<dyn CommandSource>>,
        mut shutdown: Shutdown,
    ) -> PipelineStats {
        let dispatcher = Arc::new(Dispatcher::single(notifier));
        let renderer = Arc::new(TemplateRenderer::new());
        let chats: Arc<HashMap<String, i64>> = Arc::new(
            self.projects
                .iter()
                .map(|p| (p.parser.project().to_string(), p.chat_id))
                .collect(),
        );

        let mut targets: HashMap<i64, Vec<ExportTarget>> = HashMap::new();
        for project in &self.projects {
            targets.entry(project.chat_id).or_default().push(ExportTarget {
                log: project.log.clone(),
                parser: project.parser.clone(),
            });
        }

        let (sender, stream) = router::channel(self.options.channel_capacity);
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        for project in self.projects {
            tasks.push(router::spawn_project(
                project.tail,
                project.parser,
                Arc::clone(&self.stage),
                sender.clone(),
                shutdown.clone(),
            ));
        }
        // The consumer sees end-of-stream once every producer is gone.
        drop(sender);

        let pipeline = tokio::spawn(
            Pipeline::new(
                Arc::clone(&self.aggregator),
                self.policy,
                self.started_at,
                Arc::clone(&renderer),
                Arc::clone(&dispatcher),
                Arc::clone(&chats),
            )
            .run(stream),
        );

        let reports = ReportLoop::new(
            self.scheduler,
            Arc::clone(&self.aggregator),
            renderer,
            Arc::clone(&dispatcher),
            chats,
            self.options.tick_interval,
        );
        tasks.push(tokio::spawn(reports.run(shutdown.clone())));

        if let Some(source) = commands {
            let listener = CommandListener::new(
                source,
                dispatcher,
                targets,
                Arc::clone(&self.stage),
                self.options.export_dir.clone(),
            );
            tasks.push(tokio::spawn(listener.run(shutdown.clone())));
        }

        info!(tasks = tasks.len() + 1, "daemon running");
        shutdown.wait().await;
        info!(timeout = ?self.options.shutdown_timeout, "shutting down");

        let aborts: Vec<_> = tasks
            .iter()
            .map(JoinHandle::abort_handle)
            .chain(std::iter::once(pipeline.abort_handle()))
            .collect();

        let joined = tokio::time::timeout(self.options.shutdown_timeout, async move {
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "task ended abnormally");
                }
            }
            pipeline.await
        })
        .await;

        match joined {
            Ok(Ok(stats)) => {
                info!("shutdown complete");
                stats
            }
            Ok(Err(e)) => {
                warn!(error = %e, "event consumer ended abnormally");
                PipelineStats::default()
            }
            Err(_) => {
                warn!("shutdown timed out, aborting remaining tasks");
                for abort in aborts {
                    abort.abort();
                }
                PipelineStats::default()
            }
        }
    }
}
