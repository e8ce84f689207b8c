use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::warn;

use crate::error::RateLimitError;
use crate::error::Result;
use crate::registry::ClientRegistry;

/// Background task that drops idle clients from a registry
///
/// Without it the registry keeps one entry per address ever seen. The task
/// lives until [`Sweeper::stop`] is called, normally at server shutdown.
pub struct Sweeper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping `registry` every `interval`
    ///
    /// Must be called from within a tokio runtime. A zero interval is rejected.
    pub fn spawn(registry: Arc<ClientRegistry>, interval: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(RateLimitError::InvalidConfig("sweep_interval must be greater than 0"));
        }

        let (shutdown, mut stop) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // The first tick completes immediately and there is nothing to evict yet
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        registry.evict_idle(Instant::now());
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            debug!("idle client sweeper stopped");
        });

        debug!(interval_ms = interval.as_millis() as u64, "idle client sweeper started");
        Ok(Self { shutdown, task })
    }

    /// Signal the task to exit and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);

        if let Err(err) = self.task.await {
            warn!("idle client sweeper ended abnormally: {err}");
        }
    }
}
