//! Chat command listener. `/export` sends each project mapped to the
//! asking chat as a spreadsheet.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use logwarden_core::Shutdown;
use logwarden_export::export_log;
use logwarden_ingest::{EnrichmentStage, LineParser};
use logwarden_notify::templating::escape_html;
use logwarden_notify::{ChatCommand, CommandSource, Dispatcher, Notification};
use tracing::{debug, info, warn};

pub const EXPORT_COMMAND: &str = "export";
pub const EXPORT_DESCRIPTION: &str = "Export log to Excel";

/// Pause after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// A project that can be exported.
#[derive(Debug, Clone)]
pub struct ExportTarget {
    pub log: PathBuf,
    pub parser: LineParser,
}

pub struct CommandListener {
    source: Arc<dyn CommandSource>,
    dispatcher: Arc<Dispatcher>,
    targets: HashMap<i64, Vec<ExportTarget>>,
    stage: Arc<EnrichmentStage>,
    export_dir: PathBuf,
}

impl CommandListener {
    pub fn new(
        source: Arc<dyn CommandSource>,
        dispatcher: Arc<Dispatcher>,
        targets: HashMap<i64, Vec<ExportTarget>>,
        stage: Arc<EnrichmentStage>,
        export_dir: PathBuf,
    ) -> Self {
        Self {
            source,
            dispatcher,
            targets,
            stage,
            export_dir,
        }
    }

    /// Publish the command menu. Failure only costs the menu.
    pub async fn register(&self) {
        match self
            .source
            .register_commands(&[(EXPORT_COMMAND, EXPORT_DESCRIPTION)])
            .await
        {
            Ok(()) => info!(command = EXPORT_COMMAND, "bot commands registered"),
            Err(e) => warn!(error = %e, "cannot register bot commands"),
        }
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        self.register().await;

        let mut offset = None;
        loop {
            let polled = tokio::select! {
                _ = shutdown.wait() => break,
                polled = self.source.poll_commands(offset) => polled,
            };

            match polled {
                Ok(batch) => {
                    if batch.next_offset.is_some() {
                        offset = batch.next_offset;
                    }
                    for command in &batch.commands {
                        self.handle(command).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "polling bot commands failed");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                    }
                }
            }
        }
        debug!("command listener stopped");
    }

    /// Execute one command. Returns the number of files delivered.
    pub async fn handle(&self, command: &ChatCommand) -> usize {
        if command.name != EXPORT_COMMAND {
            debug!(chat_id = command.chat_id, command = %command.name, "ignoring unknown command");
            return 0;
        }
        let Some(targets) = self.targets.get(&command.chat_id) else {
            info!(chat_id = command.chat_id, "export requested from a chat with no projects");
            return 0;
        };

        let mut delivered = 0;
        for target in targets {
            let project = target.parser.project();
            info!(project, chat_id = command.chat_id, "exporting log");

            let exported = match export_log(
                &target.log,
                &target.parser,
                &self.stage,
                &self.export_dir,
                Utc::now(),
            )
            .await
            {
                Ok(exported) => exported,
                Err(e) => {
                    warn!(project, error = %e, "export failed");
                    continue;
                }
            };

            let Some(file) = exported else {
                let note = Notification::new(
                    format!("export {project}"),
                    format!("Nothing to export for <b>{}</b>.", escape_html(project)),
                );
                self.dispatcher.dispatch(command.chat_id, &note).await;
                continue;
            };

            let results = self
                .dispatcher
                .dispatch_document(command.chat_id, &file.path, Some(project))
                .await;
            if results.iter().any(|r| r.success) {
                delivered += 1;
            }
            if let Err(e) = tokio::fs::remove_file(&file.path).await {
                warn!(path = %file.path.display(), error = %e, "cannot remove export file");
            }
        }
        delivered
    }
}
