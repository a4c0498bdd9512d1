use logwarden_core::ShutdownTrigger;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
pub async fn os_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received Ctrl+C");
        Ok(())
    }
}

/// Fire `trigger` on the first OS shutdown signal.
///
/// If the handlers cannot be installed the trigger fires immediately.
pub fn forward_to(trigger: ShutdownTrigger) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = os_signal().await {
            error!(error = %e, "cannot listen for shutdown signals");
        }
        trigger.trigger();
    })
}
