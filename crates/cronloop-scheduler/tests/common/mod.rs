// Shared fixtures for the integration tests: a queue that records
// submissions, a store that always fails and a harness wiring them up.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use cronloop_core::{Cadence, Job, JobId, JobStatus, Run, RunId, StatusTransition};
use cronloop_scheduler::{
    FixedClock, JobStore, Queue, QueueError, Registry, RegistryBuilder, RunOutcome, Runner,
    Scheduler, SqliteStore, StoreError, TaskHandle, TaskPayload,
};

#[derive(Default)]
pub struct RecordingQueue {
    pub submitted: Mutex<Vec<(DateTime<Utc>, TaskPayload)>>,
    pub refuse: AtomicBool,
}

impl RecordingQueue {
    pub fn entries(&self) -> Vec<(DateTime<Utc>, TaskPayload)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl Queue for RecordingQueue {
    fn schedule_at(&self, at: DateTime<Utc>, payload: TaskPayload) -> Result<TaskHandle, QueueError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(QueueError::Rejected("broker unavailable".into()));
        }
        self.submitted.lock().unwrap().push((at, payload));
        Ok(TaskHandle::new())
    }
}

/// Store whose every call fails, to exercise the rescheduling guarantee.
pub struct BrokenStore;

fn broken<T>() -> Result<T, StoreError> {
    Err(StoreError::Database(rusqlite::Error::InvalidQuery))
}

impl JobStore for BrokenStore {
    fn get_or_create_job(&self, _: &str, _: Cadence, _: &str, _: DateTime<Utc>) -> Result<Job, StoreError> {
        broken()
    }
    fn get_job(&self, _: &str) -> Result<Option<Job>, StoreError> {
        broken()
    }
    fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        broken()
    }
    fn create_run(&self, _: &JobId, _: DateTime<Utc>) -> Result<RunId, StoreError> {
        broken()
    }
    fn complete_run(&self, _: &RunId, _: &RunOutcome, _: DateTime<Utc>) -> Result<(), StoreError> {
        broken()
    }
    fn update_job_status(
        &self,
        _: &JobId,
        _: JobStatus,
        _: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, StoreError> {
        broken()
    }
    fn update_job_latest_run_date(&self, _: &JobId, _: DateTime<Utc>) -> Result<(), StoreError> {
        broken()
    }
    fn finish_run(
        &self,
        _: &JobId,
        _: &RunId,
        _: &RunOutcome,
        _: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, StoreError> {
        broken()
    }
    fn list_runs(&self, _: &JobId, _: usize) -> Result<Vec<Run>, StoreError> {
        broken()
    }
    fn list_transitions(&self, _: &JobId) -> Result<Vec<StatusTransition>, StoreError> {
        broken()
    }
    fn delete_job(&self, _: &str) -> Result<(), StoreError> {
        broken()
    }
    fn prune_runs(&self, _: DateTime<Utc>) -> Result<usize, StoreError> {
        broken()
    }
}

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).single().unwrap()
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub queue: Arc<RecordingQueue>,
    pub clock: Arc<FixedClock>,
    pub runner: Runner,
}

impl Harness {
    /// Build a runner over an in-memory store with the clock at `now`.
    pub fn new(now: DateTime<Utc>, register: impl FnOnce(&mut RegistryBuilder)) -> Self {
        let mut builder = Registry::builder();
        register(&mut builder);

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let queue = Arc::new(RecordingQueue::default());
        let clock = Arc::new(FixedClock::new(now));
        let scheduler = Arc::new(Scheduler::new(queue.clone(), clock.clone()));
        let runner = Runner::new(Arc::new(builder.build()), store.clone(), scheduler);

        Self {
            store,
            queue,
            clock,
            runner,
        }
    }

    pub fn job(&self, name: &str) -> Job {
        self.store.get_job(name).unwrap().expect("job row exists")
    }
}

/// Which store call [`StepFailingStore`] refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    CreateRun,
    FinishRun,
}

/// In-memory SQLite store that fails one step of the run lifecycle and
/// behaves normally otherwise.
pub struct StepFailingStore {
    inner: SqliteStore,
    fail_at: FailAt,
}

impl StepFailingStore {
    pub fn new(fail_at: FailAt) -> Self {
        Self {
            inner: SqliteStore::open_in_memory().unwrap(),
            fail_at,
        }
    }
}

impl JobStore for StepFailingStore {
    fn get_or_create_job(&self, name: &str, cadence: Cadence, description: &str, at: DateTime<Utc>) -> Result<Job, StoreError> {
        self.inner.get_or_create_job(name, cadence, description, at)
    }
    fn get_job(&self, name: &str) -> Result<Option<Job>, StoreError> {
        self.inner.get_job(name)
    }
    fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.inner.list_jobs()
    }
    fn create_run(&self, job_id: &JobId, at: DateTime<Utc>) -> Result<RunId, StoreError> {
        if self.fail_at == FailAt::CreateRun {
            return broken();
        }
        self.inner.create_run(job_id, at)
    }
    fn complete_run(&self, run_id: &RunId, outcome: &RunOutcome, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.complete_run(run_id, outcome, at)
    }
    fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, StoreError> {
        self.inner.update_job_status(job_id, status, at)
    }
    fn update_job_latest_run_date(&self, job_id: &JobId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.inner.update_job_latest_run_date(job_id, at)
    }
    fn finish_run(
        &self,
        job_id: &JobId,
        run_id: &RunId,
        outcome: &RunOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<StatusTransition>, StoreError> {
        if self.fail_at == FailAt::FinishRun {
            return broken();
        }
        self.inner.finish_run(job_id, run_id, outcome, at)
    }
    fn list_runs(&self, job_id: &JobId, limit: usize) -> Result<Vec<Run>, StoreError> {
        self.inner.list_runs(job_id, limit)
    }
    fn list_transitions(&self, job_id: &JobId) -> Result<Vec<StatusTransition>, StoreError> {
        self.inner.list_transitions(job_id)
    }
    fn delete_job(&self, name: &str) -> Result<(), StoreError> {
        self.inner.delete_job(name)
    }
    fn prune_runs(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.prune_runs(before)
    }
}

/// Queue whose submissions panic, leaving the scheduler's table poisoned.
pub struct PanickingQueue;

impl Queue for PanickingQueue {
    fn schedule_at(&self, _: DateTime<Utc>, _: TaskPayload) -> Result<TaskHandle, QueueError> {
        panic!("queue backend crashed");
    }
}
