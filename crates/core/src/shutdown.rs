//! Process-wide shutdown signal shared by every long-running task.

use tokio::sync::watch;

/// Sending half. Dropping it also counts as a shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Cloneable receiving half handed to each task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a connected trigger/signal pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace never fails even when every receiver is gone.
        self.tx.send_replace(true);
    }

    /// Another receiver for tasks spawned after startup.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            rx: self.tx.subscribe(),
        }
    }
}

impl Shutdown {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown was requested (or the trigger was dropped).
    /// Cancel-safe, so it can sit in a `tokio::select!` branch.
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_trigger() {
        let (trigger, mut shutdown) = channel();
        assert!(!shutdown.is_triggered());

        let handle = tokio::spawn(async move {
            shutdown.wait().await;
            shutdown.is_triggered()
        });
        trigger.trigger();

        let seen = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait should resolve")
            .unwrap();
        assert!(seen);
    }

    #[tokio::test]
    async fn late_subscribers_see_trigger() {
        let (trigger, _shutdown) = channel();
        trigger.trigger();
        let mut late = trigger.subscribe();
        tokio::time::timeout(Duration::from_secs(1), late.wait())
            .await
            .expect("already-triggered signal resolves immediately");
    }

    #[tokio::test]
    async fn dropping_trigger_releases_waiters() {
        let (trigger, mut shutdown) = channel();
        drop(trigger);
        tokio::time::timeout(Duration::from_secs(1), shutdown.wait())
            .await
            .expect("closed channel resolves");
    }
}
