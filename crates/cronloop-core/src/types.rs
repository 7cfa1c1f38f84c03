use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary key of a persisted job row (UUIDv4).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Primary key of a run record. UUIDv7 so ids sort by creation time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// How often a job is meant to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    EveryMinute,
    EveryTenMinutes,
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    pub const ALL: [Cadence; 6] = [
        Cadence::EveryMinute,
        Cadence::EveryTenMinutes,
        Cadence::Hourly,
        Cadence::Daily,
        Cadence::Weekly,
        Cadence::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::EveryMinute => "every_minute",
            Cadence::EveryTenMinutes => "every_ten_minutes",
            Cadence::Hourly => "hourly",
            Cadence::Daily => "daily",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Cadence::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown cadence: {s}"))
    }
}

/// Aggregate health of a job across its runs.
///
/// `New` is only ever the initial value. `Deprecated` is set from outside the
/// runner and is left alone by run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    New,
    Succeeding,
    Failing,
    Deprecated,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "new",
            JobStatus::Succeeding => "succeeding",
            JobStatus::Failing => "failing",
            JobStatus::Deprecated => "deprecated",
        }
    }

    /// Status the job moves to after a run finishing with `outcome`.
    ///
    /// Returns `None` when the status does not change, which is also the
    /// signal that no transition row may be written.
    pub fn after_run(self, outcome: RunStatus) -> Option<JobStatus> {
        let target = match outcome {
            RunStatus::Succeeded => JobStatus::Succeeding,
            RunStatus::Failed => JobStatus::Failing,
            RunStatus::InProgress => return None,
        };
        match self {
            JobStatus::Deprecated => None,
            current if current == target => None,
            _ => Some(target),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "new" => Ok(JobStatus::New),
            "succeeding" => Ok(JobStatus::Succeeding),
            "failing" => Ok(JobStatus::Failing),
            "deprecated" => Ok(JobStatus::Deprecated),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Lifecycle of a single run: created `InProgress`, finished exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(RunStatus::InProgress),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {other}")),
        }
    }
}

/// Persisted configuration and live state of a job, one row per name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Stable key matching the in-memory registry entry.
    pub name: String,
    pub description: String,
    pub cadence: Cadence,
    pub status: JobStatus,
    pub latest_status_change: Option<DateTime<Utc>>,
    /// Set on every finished run, success or failure.
    pub latest_run_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// How long the job has been in its current status as of its latest run,
    /// e.g. `"2 days, 1 hour"`. Empty when either timestamp is missing.
    pub fn time_since_status_change(&self) -> String {
        match (self.latest_run_date, self.latest_status_change) {
            (Some(run), Some(change)) => humanize_duration(run - change),
            _ => String::new(),
        }
    }
}

/// Render a duration as comma-separated day/hour/minute/second parts.
pub fn humanize_duration(span: chrono::Duration) -> String {
    let total = span.num_seconds().max(0);
    let (days, rem) = (total / 86_400, total % 86_400);
    let (hours, rem) = (rem / 3_600, rem % 3_600);
    let (minutes, seconds) = (rem / 60, rem % 60);

    let parts: Vec<String> = [
        (days, "day"),
        (hours, "hour"),
        (minutes, "minute"),
        (seconds, "second"),
    ]
    .into_iter()
    .filter(|(n, _)| *n > 0)
    .map(|(n, unit)| format!("{n} {unit}{}", if n == 1 { "" } else { "s" }))
    .collect();

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}

/// One recorded execution attempt of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub job_id: JobId,
    pub status: RunStatus,
    /// Failure description; empty unless `status` is `Failed`.
    pub error: String,
    /// Payload returned by a successful job function.
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completion_date: Option<DateTime<Utc>>,
}

/// Audit row for an actual change of `Job::status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub id: String,
    pub job_id: JobId,
    pub old_value: JobStatus,
    pub new_value: JobStatus,
    pub created_at: DateTime<Utc>,
}
