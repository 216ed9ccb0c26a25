//! Background garbage collection for throttle windows.

use super::RequestThrottle;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Owns the sweep task. Dropping the handle aborts the task; call
/// [`shutdown`](SweeperHandle::shutdown) to stop it cleanly.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SweeperHandle {
    pub(crate) fn spawn(throttle: RequestThrottle, every: Duration) -> Self {
        // tokio intervals panic on a zero period
        let every = every.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        throttle.sweep();
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!(target: "scenario_governor::throttle", "sweeper stopped");
                        break;
                    }
                }
            }
        });

        Self { shutdown_tx: Some(shutdown_tx), task: Some(task) }
    }

    /// Stop sweeping and wait for the task to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Whether the sweep task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
