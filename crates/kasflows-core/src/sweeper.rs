//! Periodic eviction of idle sessions.

use crate::relay::Relay;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Runs [`Relay::expire`] every `sweep_interval`.
///
/// Nothing is scheduled until [`ExpirySweeper::start`] is called; tests can
/// drive [`ExpirySweeper::tick`] directly instead.
#[derive(Clone)]
pub struct ExpirySweeper {
    relay: Arc<Relay>,
}

impl ExpirySweeper {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// One sweep pass as of `now`. Returns the evicted names.
    pub fn tick(&self, now: Instant) -> Vec<String> {
        self.relay.expire(now)
    }

    /// Spawn the sweep loop on the current tokio runtime.
    pub fn start(self) -> SweeperHandle {
        let period = self.relay.config().sweep_interval;
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    now = interval.tick() => {
                        let evicted = self.tick(now);
                        if !evicted.is_empty() {
                            debug!(count = evicted.len(), "sweep evicted clients");
                        }
                    }
                }
            }

            debug!("sweep loop ended");
        });

        info!(interval_secs = period.as_secs_f64(), "expiry sweeper started");
        SweeperHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Controls a running sweep loop. Dropping the handle aborts the loop.
pub struct SweeperHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    /// Stop the loop and wait for it to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("expiry sweeper stopped");
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
