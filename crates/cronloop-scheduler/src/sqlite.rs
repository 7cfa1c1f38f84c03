use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use tracing::{debug, info};
use uuid::Uuid;

use cronloop_core::{Cadence, Job, JobId, JobStatus, Run, RunId, RunStatus, StatusTransition};

use crate::{
    db::init_db,
    error::{StoreError, StoreResult},
    store::{JobStore, RunOutcome},
};

const JOB_COLUMNS: &str = "id, name, description, cadence, status, latest_status_change, \
                           latest_run_date, created_at, updated_at";
const RUN_COLUMNS: &str = "id, job_id, status, error, data, created_at, completion_date";
const TRANSITION_COLUMNS: &str = "id, job_id, old_value, new_value, created_at";

/// [`JobStore`] over a single SQLite connection.
///
/// The connection sits behind a `Mutex`, so concurrent runs serialise on
/// store access while their job functions still execute in parallel.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap `conn`, enabling foreign keys and creating the schema if needed.
    pub fn new(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("store connection poisoned")
    }
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_ts(idx, &row.get::<_, String>(idx)?)
}

fn opt_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|raw| parse_ts(idx, &raw))
        .transpose()
}

/// Parse an enum stored by its `Display` string.
fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    row.get::<_, String>(idx)?
        .parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: JobId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        cadence: enum_column::<Cadence>(row, 3)?,
        status: enum_column::<JobStatus>(row, 4)?,
        latest_status_change: opt_ts_column(row, 5)?,
        latest_run_date: opt_ts_column(row, 6)?,
        created_at: ts_column(row, 7)?,
        updated_at: ts_column(row, 8)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    let data = row
        .get::<_, Option<String>>(4)?
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    Ok(Run {
        id: RunId(row.get(0)?),
        job_id: JobId(row.get(1)?),
        status: enum_column::<RunStatus>(row, 2)?,
        error: row.get(3)?,
        data,
        created_at: ts_column(row, 5)?,
        completion_date: opt_ts_column(row, 6)?,
    })
}

fn row_to_transition(row: &Row<'_>) -> rusqlite::Result<StatusTransition> {
    Ok(StatusTransition {
        id: row.get(0)?,
        job_id: JobId(row.get(1)?),
        old_value: enum_column::<JobStatus>(row, 2)?,
        new_value: enum_column::<JobStatus>(row, 3)?,
        created_at: ts_column(row, 4)?,
    })
}

// --- statement helpers (shared by plain and transactional paths) -----------

fn fetch_job(conn: &Connection, name: &str) -> StoreResult<Option<Job>> {
    let job = conn
        .query_row(
            &format!("SELECT {JOB_COLUMNS} FROM cron_jobs WHERE name = ?1"),
            [name],
            row_to_job,
        )
        .optional()?;
    Ok(job)
}

fn current_status(conn: &Connection, job_id: &JobId) -> StoreResult<JobStatus> {
    conn.query_row(
        "SELECT status FROM cron_jobs WHERE id = ?1",
        [job_id.as_str()],
        |row| enum_column::<JobStatus>(row, 0),
    )
    .optional()?
    .ok_or_else(|| StoreError::JobNotFound {
        name: job_id.to_string(),
    })
}

fn write_transition(
    conn: &Connection,
    job_id: &JobId,
    old_value: JobStatus,
    new_value: JobStatus,
    at: DateTime<Utc>,
) -> StoreResult<StatusTransition> {
    let now = ts(at);
    conn.execute(
        "UPDATE cron_jobs SET status = ?1, latest_status_change = ?2, updated_at = ?2
         WHERE id = ?3",
        params![new_value.as_str(), now, job_id.as_str()],
    )?;
    let id = Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO cron_job_status_transitions (id, job_id, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, job_id.as_str(), old_value.as_str(), new_value.as_str(), now],
    )?;
    Ok(StatusTransition {
        id,
        job_id: job_id.clone(),
        old_value,
        new_value,
        created_at: at,
    })
}

fn complete_run_in(
    conn: &Connection,
    run_id: &RunId,
    outcome: &RunOutcome,
    at: DateTime<Utc>,
) -> StoreResult<()> {
    let (error, data) = match outcome {
        RunOutcome::Succeeded(value) => ("", Some(serde_json::to_string(value)?)),
        RunOutcome::Failed(message) => (message.as_str(), None),
    };
    // Guarding on in_progress keeps a run from ever being completed twice.
    let n = conn.execute(
        "UPDATE cron_job_runs SET status = ?1, error = ?2, data = ?3, completion_date = ?4
         WHERE id = ?5 AND status = 'in_progress'",
        params![outcome.status().as_str(), error, data, ts(at), run_id.as_str()],
    )?;
    if n == 0 {
        return Err(StoreError::RunNotOpen {
            id: run_id.to_string(),
        });
    }
    Ok(())
}

fn stamp_latest_run(conn: &Connection, job_id: &JobId, at: DateTime<Utc>) -> StoreResult<()> {
    let n = conn.execute(
        "UPDATE cron_jobs SET latest_run_date = ?1, updated_at = ?1 WHERE id = ?2",
        params![ts(at), job_id.as_str()],
    )?;
    if n == 0 {
        return Err(StoreError::JobNotFound {
            name: job_id.to_string(),
        });
    }
    Ok(())
}

impl JobStore for SqliteStore {
    fn get_or_create_job(
        &self,
        name: &str,
        cadence_if_new: Cadence,
        description_if_new: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Job> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO cron_jobs (id, name, description, cadence, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'new', ?5, ?5)
             ON CONFLICT(name) DO NOTHING",
            params![
                JobId::new().as_str(),
                name,
                description_if_new,
                cadence_if_new.as_str(),
                ts(at)
            ],
        )?;
        if inserted > 0 {
            info!(job = %name, cadence = %cadence_if_new, "cron job row created");
        }
        fetch_job(&conn, name)?.ok_or_else(|| StoreError::JobNotFound {
            name: name.to_string(),
        })
    }

    fn get_job(&self, name: &str) -> StoreResult<Option<Job>> {
        fetch_job(&self.conn(), name)
    }

    fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM cron_jobs ORDER BY name"))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn create_run(&self, job_id: &JobId, at: DateTime<Utc>) -> StoreResult<RunId> {
        let run_id = RunId::new();
        self.conn().execute(
            "INSERT INTO cron_job_runs (id, job_id, status, created_at)
             VALUES (?1, ?2, 'in_progress', ?3)",
            params![run_id.as_str(), job_id.as_str(), ts(at)],
        )?;
        debug!(%job_id, %run_id, "run opened");
        Ok(run_id)
    }

    fn complete_run(&self, run_id: &RunId, outcome: &RunOutcome, at: DateTime<Utc>) -> StoreResult<()> {
        complete_run_in(&self.conn(), run_id, outcome, at)
    }

    fn update_job_status(
        &self,
        job_id: &JobId,
        new_status: JobStatus,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<StatusTransition>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let current = current_status(&tx, job_id)?;
        if current == new_status {
            return Ok(None);
        }
        let transition = write_transition(&tx, job_id, current, new_status, at)?;
        tx.commit()?;
        Ok(Some(transition))
    }

    fn update_job_latest_run_date(&self, job_id: &JobId, at: DateTime<Utc>) -> StoreResult<()> {
        stamp_latest_run(&self.conn(), job_id, at)
    }

    fn finish_run(
        &self,
        job_id: &JobId,
        run_id: &RunId,
        outcome: &RunOutcome,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<StatusTransition>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        complete_run_in(&tx, run_id, outcome, at)?;
        stamp_latest_run(&tx, job_id, at)?;
        // Read the status inside the transaction so the decision is made
        // against the row we are about to write.
        let current = current_status(&tx, job_id)?;
        let transition = match current.after_run(outcome.status()) {
            Some(next) => Some(write_transition(&tx, job_id, current, next, at)?),
            None => None,
        };

        tx.commit()?;
        Ok(transition)
    }

    fn list_runs(&self, job_id: &JobId, limit: usize) -> StoreResult<Vec<Run>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM cron_job_runs WHERE job_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let runs = stmt
            .query_map(params![job_id.as_str(), limit], row_to_run)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    fn list_transitions(&self, job_id: &JobId) -> StoreResult<Vec<StatusTransition>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRANSITION_COLUMNS} FROM cron_job_status_transitions WHERE job_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;
        let transitions = stmt
            .query_map([job_id.as_str()], row_to_transition)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(transitions)
    }

    fn delete_job(&self, name: &str) -> StoreResult<()> {
        let n = self
            .conn()
            .execute("DELETE FROM cron_jobs WHERE name = ?1", [name])?;
        if n == 0 {
            return Err(StoreError::JobNotFound {
                name: name.to_string(),
            });
        }
        info!(job = %name, "cron job deleted");
        Ok(())
    }

    fn prune_runs(&self, before: DateTime<Utc>) -> StoreResult<usize> {
        let n = self.conn().execute(
            "DELETE FROM cron_job_runs
             WHERE status != 'in_progress' AND completion_date < ?1",
            [ts(before)],
        )?;
        debug!(count = n, before = %before, "finished runs pruned");
        Ok(n)
    }
}
