use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use logwarden_core::config::load_dotenv;
use logwarden_core::{shutdown, Config};
use logwarden_daemon::{signal, Daemon, RuntimeOptions};
use logwarden_notify::{CommandSource, Notifier, TelegramNotifier};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "logwarden", about = "Watch web server access logs and report to Telegram")]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long, env = "LOGWARDEN_CONFIG", default_value = "logwarden.yaml")]
    config: PathBuf,

    /// Events buffered between the log tails and the consumer.
    #[arg(long, env = "LOGWARDEN_CHANNEL_CAPACITY", default_value_t = 1024)]
    channel_capacity: usize,

    /// Seconds between report schedule checks.
    #[arg(long, env = "LOGWARDEN_TICK_INTERVAL", default_value_t = 1)]
    tick_interval: u64,

    /// Milliseconds between fallback polls of each log.
    #[arg(long, env = "LOGWARDEN_POLL_INTERVAL", default_value_t = 1000)]
    poll_interval: u64,

    /// Seconds to wait for tasks to finish after a shutdown signal.
    #[arg(long, env = "LOGWARDEN_SHUTDOWN_TIMEOUT", default_value_t = 10)]
    shutdown_timeout: u64,

    /// Directory for temporary export spreadsheets.
    #[arg(long, env = "LOGWARDEN_EXPORT_DIR")]
    export_dir: Option<PathBuf>,
}

impl Cli {
    fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            channel_capacity: self.channel_capacity.max(1),
            tick_interval: Duration::from_secs(self.tick_interval.max(1)),
            poll_interval: Duration::from_millis(self.poll_interval.max(10)),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout),
            export_dir: self.export_dir.clone().unwrap_or_else(std::env::temp_dir),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.log_summary();

    let daemon = Daemon::prepare(&config, cli.runtime_options())
        .await
        .context("startup failed")?;

    let telegram = Arc::new(TelegramNotifier::new(config.telegram_token.clone())?);
    let notifier: Arc<dyn Notifier> = telegram.clone();
    let commands: Arc<dyn CommandSource> = telegram;

    let (trigger, shutdown) = shutdown::channel();
    signal::forward_to(trigger);

    info!(started_at = %daemon.started_at(), "logwarden started");
    let stats = daemon.run(notifier, Some(commands), shutdown).await;
    info!(
        events = stats.events,
        recorded = stats.recorded,
        alerts = stats.alerts,
        "logwarden stopped"
    );
    Ok(())
}
