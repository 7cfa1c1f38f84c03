use chrono::{DateTime, Utc};

use cronloop_core::{Cadence, Job, JobId, JobStatus, Run, RunId, RunStatus, StatusTransition};

use crate::error::StoreResult;

/// Terminal result of a run as recorded in the store.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Succeeded(serde_json::Value),
    Failed(String),
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Succeeded(_) => RunStatus::Succeeded,
            RunOutcome::Failed(_) => RunStatus::Failed,
        }
    }
}

/// Persistence for jobs, their runs and their status audit trail.
///
/// Timestamps are passed in by the caller so a single clock drives both the
/// schedule and the records.
pub trait JobStore: Send + Sync {
    /// Fetch the job called `name`, creating it with status `new` and the
    /// given cadence/description if no row exists yet.
    fn get_or_create_job(
        &self,
        name: &str,
        cadence_if_new: Cadence,
        description_if_new: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Job>;

    fn get_job(&self, name: &str) -> StoreResult<Option<Job>>;

    /// All jobs ordered by name.
    fn list_jobs(&self) -> StoreResult<Vec<Job>>;

    /// Open a run in status `in_progress`.
    fn create_run(&self, job_id: &JobId, at: DateTime<Utc>) -> StoreResult<RunId>;

    /// Move an `in_progress` run to its terminal status. A run can be
    /// completed once; later calls fail with `RunNotOpen`.
    fn complete_run(&self, run_id: &RunId, outcome: &RunOutcome, at: DateTime<Utc>) -> StoreResult<()>;

    /// Set the job status and append the matching transition row as one unit.
    /// Returns `None` without writing anything when the status is unchanged.
    fn update_job_status(
        &self,
        job_id: &JobId,
        new_status: JobStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<StatusTransition>>;

    fn update_job_latest_run_date(&self, job_id: &JobId, at: DateTime<Utc>) -> StoreResult<()>;

    /// Record the end of a run atomically: complete the run, stamp
    /// `latest_run_date` and apply the status state machine against the
    /// job's current status. Returns the transition, if one was written.
    fn finish_run(
        &self,
        job_id: &JobId,
        run_id: &RunId,
        outcome: &RunOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<StatusTransition>>;

    /// Most recent runs first.
    fn list_runs(&self, job_id: &JobId, limit: usize) -> StoreResult<Vec<Run>>;

    /// Most recent transitions first.
    fn list_transitions(&self, job_id: &JobId) -> StoreResult<Vec<StatusTransition>>;

    /// Delete a job together with its runs and transitions.
    fn delete_job(&self, name: &str) -> StoreResult<()>;

    /// Delete terminal runs completed before `before`. Returns the count.
    fn prune_runs(&self, before: DateTime<Utc>) -> StoreResult<usize>;
}
