use rusqlite::Connection;

use crate::error::StoreResult;

/// Initialise the cron schema in `conn`.
///
/// Creates the job, run and status-transition tables (idempotent). Runs and
/// transitions cascade with their job, which needs `PRAGMA foreign_keys=ON`
/// on every connection that deletes jobs.
pub fn init_db(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cron_jobs (
            id                    TEXT NOT NULL PRIMARY KEY,
            name                  TEXT NOT NULL UNIQUE,
            description           TEXT NOT NULL DEFAULT '',
            cadence               TEXT NOT NULL DEFAULT 'hourly',
            status                TEXT NOT NULL DEFAULT 'new',
            latest_status_change  TEXT,               -- RFC 3339 or NULL
            latest_run_date       TEXT,               -- RFC 3339 or NULL
            created_at            TEXT NOT NULL,
            updated_at            TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS cron_job_runs (
            id               TEXT NOT NULL PRIMARY KEY,
            job_id           TEXT NOT NULL REFERENCES cron_jobs(id) ON DELETE CASCADE,
            status           TEXT NOT NULL DEFAULT 'in_progress',
            error            TEXT NOT NULL DEFAULT '',
            data             TEXT,                    -- JSON or NULL
            created_at       TEXT NOT NULL,
            completion_date  TEXT
        ) STRICT;

        -- Run history is always read per job, newest first.
        CREATE INDEX IF NOT EXISTS idx_cron_job_runs_job
            ON cron_job_runs (job_id, created_at);

        CREATE TABLE IF NOT EXISTS cron_job_status_transitions (
            id          TEXT NOT NULL PRIMARY KEY,
            job_id      TEXT NOT NULL REFERENCES cron_jobs(id) ON DELETE CASCADE,
            old_value   TEXT NOT NULL,
            new_value   TEXT NOT NULL,
            created_at  TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_cron_job_status_transitions_job
            ON cron_job_status_transitions (job_id, created_at);
        ",
    )?;
    Ok(())
}
