use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

use cronloop_core::{Cadence, CronError};

use crate::{
    clock::Clock,
    queue::{Queue, TaskHandle, TaskPayload},
    schedule::next_boundary,
};

/// The queue entry currently carrying a cadence's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArmedTick {
    pub cadence: Cadence,
    pub at: DateTime<Utc>,
    pub handle: TaskHandle,
}

#[derive(Default)]
struct Chains {
    /// Entry currently pending per cadence.
    armed: HashMap<Cadence, ArmedTick>,
    /// Latest boundary whose entry was delivered per cadence.
    fired: HashMap<Cadence, DateTime<Utc>>,
}

/// Re-arms cadence ticks on the queue.
///
/// Remembers the boundary last armed per cadence. Asking again for a
/// boundary that is already armed returns the existing handle instead of
/// submitting a second entry, so the re-arm done by every run and the one
/// done at the end of a tick all collapse into one queue entry per boundary.
///
/// Once a tick is delivered ([`Scheduler::mark_fired`]) its boundary becomes
/// a floor: later re-arms target the boundary after it even when the clock
/// still reads earlier, so an early delivery cannot re-arm the entry that was
/// just consumed.
pub struct Scheduler {
    queue: Arc<dyn Queue>,
    clock: Arc<dyn Clock>,
    chains: Mutex<Chains>,
}

impl Scheduler {
    pub fn new(queue: Arc<dyn Queue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            clock,
            chains: Mutex::new(Chains::default()),
        }
    }

    /// Record that the pending tick of `cadence` was delivered. Returns the
    /// consumed tick, if one was armed.
    pub fn mark_fired(&self, cadence: Cadence) -> Option<ArmedTick> {
        let mut chains = self.chains.lock().expect("armed tick table poisoned");
        let tick = chains.armed.remove(&cadence)?;
        let floor = chains.fired.entry(cadence).or_insert(tick.at);
        *floor = (*floor).max(tick.at);
        debug!(%cadence, at = %tick.at, handle = %tick.handle, "tick delivered");
        Some(tick)
    }

    /// Arm the next tick of `cadence` at `next_boundary(cadence, now)`, or at
    /// the boundary after the last delivered one when the clock lags it.
    ///
    /// A queue failure is logged at error level and returned as
    /// [`CronError::Scheduling`]: without that entry the cadence never fires
    /// again.
    pub fn enqueue_next(&self, cadence: Cadence) -> Result<TaskHandle, CronError> {
        // Held across the submission so concurrent callers cannot both arm
        // the same boundary.
        let mut chains = self.chains.lock().expect("armed tick table poisoned");
        let now = self.clock.now();
        let from = chains.fired.get(&cadence).map_or(now, |floor| now.max(*floor));
        let at = next_boundary(cadence, from);

        if let Some(tick) = chains.armed.get(&cadence).filter(|tick| tick.at == at) {
            debug!(%cadence, %at, handle = %tick.handle, "tick already armed");
            return Ok(tick.handle.clone());
        }

        let handle = self
            .queue
            .schedule_at(at, TaskPayload::Dispatch { cadence })
            .map_err(|e| {
                error!(%cadence, %at, error = %e, "failed to arm next tick; cadence is stalled");
                CronError::Scheduling {
                    target: format!("next {cadence} tick"),
                    reason: e.to_string(),
                }
            })?;

        info!(%cadence, %at, %handle, "next tick armed");
        chains.armed.insert(
            cadence,
            ArmedTick {
                cadence,
                at,
                handle: handle.clone(),
            },
        );
        Ok(handle)
    }

    /// Queue a one-shot run of a single job at `at`. Does not touch the
    /// cadence chains.
    pub fn enqueue_job(&self, name: &str, at: DateTime<Utc>) -> Result<TaskHandle, CronError> {
        self.queue
            .schedule_at(
                at,
                TaskPayload::Job {
                    name: name.to_string(),
                },
            )
            .map_err(|e| CronError::Scheduling {
                target: format!("one-shot run of {name}"),
                reason: e.to_string(),
            })
    }

    /// Snapshot of armed ticks, ordered by cadence.
    pub fn armed(&self) -> Vec<ArmedTick> {
        let chains = self.chains.lock().expect("armed tick table poisoned");
        let mut ticks: Vec<ArmedTick> = chains.armed.values().cloned().collect();
        ticks.sort_by_key(|t| t.cadence);
        ticks
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
