use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use cronloop_core::CronError;

use crate::{
    queue::{QueuedTask, TaskPayload},
    runner::Runner,
};

/// Worker loop: receives due queue entries and executes them.
///
/// Job functions are synchronous, so each fired entry runs on tokio's
/// blocking pool. Overlapping ticks run side by side.
pub struct CronEngine {
    runner: Arc<Runner>,
    rx: mpsc::Receiver<QueuedTask>,
}

impl CronEngine {
    pub fn new(runner: Arc<Runner>, rx: mpsc::Receiver<QueuedTask>) -> Self {
        Self { runner, rx }
    }

    /// Arm the first tick of every cadence that has registered jobs.
    ///
    /// Called once at startup; afterwards each tick re-arms itself.
    pub fn bootstrap(&self) -> Result<usize, CronError> {
        let cadences = self.runner.registry().cadences();
        for cadence in &cadences {
            self.runner.scheduler().enqueue_next(*cadence)?;
        }
        info!(count = cadences.len(), "cadence chains armed");
        Ok(cadences.len())
    }

    /// Main event loop. Runs until `shutdown` broadcasts `true` or the queue
    /// side hangs up.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("cron engine started");
        loop {
            tokio::select! {
                task = self.rx.recv() => match task {
                    Some(task) => {
                        tokio::spawn(execute_blocking(Arc::clone(&self.runner), task));
                    }
                    None => {
                        warn!("queue closed; cron engine stopping");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("cron engine shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Execute one fired queue entry on tokio's blocking pool and wait for it.
///
/// Returns `false` if the execution panicked. The panic is logged at error
/// level since a panicking tick leaves its cadence without a successor.
pub async fn execute_blocking(runner: Arc<Runner>, task: QueuedTask) -> bool {
    let handle = task.handle.clone();
    let payload = task.payload.clone();
    match tokio::task::spawn_blocking(move || execute(&runner, task)).await {
        Ok(()) => true,
        Err(e) if e.is_panic() => {
            error!(%handle, ?payload, "queued task panicked; its chain may be broken: {e}");
            false
        }
        Err(e) => {
            warn!(%handle, ?payload, "queued task was cancelled: {e}");
            false
        }
    }
}

/// Execute one fired queue entry on the current thread.
pub fn execute(runner: &Runner, task: QueuedTask) {
    match task.payload {
        TaskPayload::Dispatch { cadence } => {
            if let Err(e) = runner.dispatch(cadence) {
                error!(%cadence, handle = %task.handle, code = e.code(), "tick chain broken: {e}");
            }
        }
        TaskPayload::Job { name } => match runner.run_cron(&name) {
            Ok(_) => {}
            Err(e @ CronError::Scheduling { .. }) => {
                error!(job = %name, code = e.code(), "one-shot run could not re-arm: {e}");
            }
            Err(e) => warn!(job = %name, code = e.code(), "one-shot run did not succeed: {e}"),
        },
    }
}
