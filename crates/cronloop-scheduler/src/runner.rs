use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use cronloop_core::{Cadence, CronError};

use crate::{
    registry::{CronTask, RegisteredJob, Registry},
    scheduler::Scheduler,
    store::{JobStore, RunOutcome},
};

/// Executes registered jobs, records their runs and keeps the cadence
/// chains armed.
pub struct Runner {
    registry: Arc<Registry>,
    store: Arc<dyn JobStore>,
    scheduler: Arc<Scheduler>,
}

impl Runner {
    pub fn new(registry: Arc<Registry>, store: Arc<dyn JobStore>, scheduler: Arc<Scheduler>) -> Self {
        Self {
            registry,
            store,
            scheduler,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Run the job called `name` once and re-arm its cadence.
    ///
    /// An unknown name fails with `Configuration` and touches nothing. For a
    /// known name the next tick of the job's cadence is armed whatever the
    /// outcome, including store failures. Errors are reported in order of
    /// severity: `Scheduling`, then `Store`, then `Execution`.
    pub fn run_cron(&self, name: &str) -> Result<serde_json::Value, CronError> {
        let entry = self.registry.lookup(name)?;

        let mut cadence = entry.cadence;
        let result = self.execute(entry, &mut cadence);
        if let Err(CronError::Store(ref e)) = result {
            error!(job = %name, error = %e, "failed to record run");
        }

        self.scheduler.enqueue_next(cadence)?;
        result
    }

    /// One tick of `cadence`: consume the armed tick, run every job
    /// registered under it, then re-arm.
    ///
    /// A failing job never stops the others. Only a failure to re-arm is
    /// returned; everything else is already recorded and logged.
    pub fn dispatch(&self, cadence: Cadence) -> Result<(), CronError> {
        self.scheduler.mark_fired(cadence);

        let (mut succeeded, mut failed) = (0usize, 0usize);
        for name in self.registry.names(cadence) {
            match self.run_cron(name) {
                Ok(_) => succeeded += 1,
                Err(e) => {
                    failed += 1;
                    debug!(job = %name, code = e.code(), "tick member did not succeed");
                }
            }
        }
        info!(%cadence, succeeded, failed, "tick finished");

        self.scheduler.enqueue_next(cadence).map(|_| ())
    }

    fn execute(&self, entry: &RegisteredJob, cadence: &mut Cadence) -> Result<serde_json::Value, CronError> {
        let clock = self.scheduler.clock();
        let job = self.store.get_or_create_job(
            &entry.name,
            entry.cadence,
            &entry.description,
            clock.now(),
        )?;
        // The persisted cadence is authoritative once the row exists.
        *cadence = job.cadence;

        let run_id = self.store.create_run(&job.id, clock.now())?;
        debug!(job = %entry.name, %run_id, "run started");

        let outcome = invoke(entry.task.as_ref());
        let transition = self
            .store
            .finish_run(&job.id, &run_id, &outcome, clock.now())?;

        if let Some(t) = transition {
            info!(job = %entry.name, from = %t.old_value, to = %t.new_value, "job status changed");
        }

        match outcome {
            RunOutcome::Succeeded(data) => {
                info!(job = %entry.name, %run_id, "run succeeded");
                Ok(data)
            }
            RunOutcome::Failed(message) => {
                warn!(job = %entry.name, %run_id, error = %message, "run failed");
                Err(CronError::Execution {
                    name: entry.name.clone(),
                    message,
                })
            }
        }
    }
}

/// Call the job function, turning both returned failures and panics into a
/// [`RunOutcome::Failed`].
fn invoke(task: &dyn CronTask) -> RunOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
        Ok(Ok(data)) => RunOutcome::Succeeded(data),
        Ok(Err(failure)) if failure.message().is_empty() => {
            RunOutcome::Failed("job failed without a message".to_string())
        }
        Ok(Err(failure)) => RunOutcome::Failed(failure.to_string()),
        Err(payload) => RunOutcome::Failed(format!("job panicked: {}", panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
