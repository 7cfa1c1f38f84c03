use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use cronloop_core::{Cadence, CronError};

/// Failure returned by a job function. The message ends up in `Run::error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    message: String,
}

impl JobFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for JobFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for JobFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Explicit outcome of a job function: a JSON payload or a failure message.
pub type JobResult = std::result::Result<serde_json::Value, JobFailure>;

/// A unit of work that can be registered under a cadence.
///
/// Implemented for any `Fn() -> JobResult`, so plain functions and closures
/// can be registered directly.
pub trait CronTask: Send + Sync {
    fn run(&self) -> JobResult;
}

impl<F> CronTask for F
where
    F: Fn() -> JobResult + Send + Sync,
{
    fn run(&self) -> JobResult {
        self()
    }
}

/// Registry entry: the function plus the metadata seeded into a new job row.
#[derive(Clone)]
pub struct RegisteredJob {
    pub name: String,
    pub task: Arc<dyn CronTask>,
    pub cadence: Cadence,
    pub description: String,
}

impl fmt::Debug for RegisteredJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredJob")
            .field("name", &self.name)
            .field("cadence", &self.cadence)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Mutable startup-phase table. Call [`RegistryBuilder::build`] once every job
/// is registered; the resulting [`Registry`] cannot be changed.
#[derive(Default)]
pub struct RegistryBuilder {
    jobs: BTreeMap<String, RegisteredJob>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job. Registering a name twice keeps the last entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        task: impl CronTask + 'static,
        cadence: Cadence,
        description: impl Into<String>,
    ) -> &mut Self {
        let name = name.into();
        let entry = RegisteredJob {
            name: name.clone(),
            task: Arc::new(task),
            cadence,
            description: description.into(),
        };
        if self.jobs.insert(name.clone(), entry).is_some() {
            warn!(job = %name, "cron job registered twice; keeping the latest definition");
        } else {
            debug!(job = %name, %cadence, "cron job registered");
        }
        self
    }

    pub fn build(self) -> Registry {
        Registry { jobs: self.jobs }
    }
}

/// Read-only mapping from job name to its registered descriptor.
///
/// Built once at startup and shared as `Arc<Registry>` with the runner and
/// the engine.
#[derive(Debug, Default)]
pub struct Registry {
    jobs: BTreeMap<String, RegisteredJob>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredJob, CronError> {
        self.jobs.get(name).ok_or_else(|| CronError::Configuration {
            name: name.to_string(),
        })
    }

    /// Names registered under `cadence`, in name order. The iterator is lazy
    /// and can be cloned to walk the same sequence again.
    pub fn names(&self, cadence: Cadence) -> impl Iterator<Item = &str> + Clone + '_ {
        self.jobs
            .values()
            .filter(move |job| job.cadence == cadence)
            .map(|job| job.name.as_str())
    }

    /// Cadences with at least one registered job.
    pub fn cadences(&self) -> BTreeSet<Cadence> {
        self.jobs.values().map(|job| job.cadence).collect()
    }

    pub fn jobs(&self) -> impl Iterator<Item = &RegisteredJob> + '_ {
        self.jobs.values()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop() -> JobResult {
        Ok(serde_json::Value::Null)
    }

    #[test]
    fn lookup_unknown_name_is_configuration_error() {
        let registry = Registry::builder().build();
        let err = registry.lookup("missing").unwrap_err();
        assert!(matches!(err, CronError::Configuration { ref name } if name == "missing"));
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn last_registration_wins() {
        let mut builder = Registry::builder();
        builder
            .register("sync", noop, Cadence::Hourly, "first")
            .register("sync", || -> JobResult { Ok(json!({"v": 2})) }, Cadence::Daily, "second");
        let registry = builder.build();

        assert_eq!(registry.len(), 1);
        let job = registry.lookup("sync").unwrap();
        assert_eq!(job.cadence, Cadence::Daily);
        assert_eq!(job.description, "second");
        assert_eq!(job.task.run().unwrap(), json!({"v": 2}));
    }

    #[test]
    fn names_filters_by_cadence_and_restarts() {
        let mut builder = Registry::builder();
        builder
            .register("b_hourly", noop, Cadence::Hourly, "")
            .register("a_hourly", noop, Cadence::Hourly, "")
            .register("nightly", noop, Cadence::Daily, "");
        let registry = builder.build();

        let names = registry.names(Cadence::Hourly);
        let first: Vec<_> = names.clone().collect();
        let second: Vec<_> = names.collect();
        assert_eq!(first, vec!["a_hourly", "b_hourly"]);
        assert_eq!(first, second);
        assert_eq!(registry.names(Cadence::Monthly).count(), 0);
    }

    #[test]
    fn cadences_lists_only_used_ones() {
        let mut builder = Registry::builder();
        builder
            .register("a", noop, Cadence::Weekly, "")
            .register("b", noop, Cadence::EveryMinute, "")
            .register("c", noop, Cadence::Weekly, "");
        let cadences: Vec<_> = builder.build().cadences().into_iter().collect();
        assert_eq!(cadences, vec![Cadence::EveryMinute, Cadence::Weekly]);
    }

    #[test]
    fn failures_carry_their_message() {
        let failing = || -> JobResult { Err("db unreachable".into()) };
        let err = failing.run().unwrap_err();
        assert_eq!(err.message(), "db unreachable");
        assert_eq!(err.to_string(), "db unreachable");
    }
}
