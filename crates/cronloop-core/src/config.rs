use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_RUN_RETENTION_DAYS: u32 = 30;

/// Top-level config (cronloop.toml + CRONLOOP_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CronloopConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Buffer between the queue timers and the worker loop.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Finished runs older than this are removed by `prune_run_history`.
    /// Override with env var: CRONLOOP_WORKER__RUN_RETENTION_DAYS=7
    #[serde(default = "default_run_retention_days")]
    pub run_retention_days: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            run_retention_days: DEFAULT_RUN_RETENTION_DAYS,
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_run_retention_days() -> u32 {
    DEFAULT_RUN_RETENTION_DAYS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cronloop/cronloop.db", home)
}

impl CronloopConfig {
    /// Load config from a TOML file with CRONLOOP_* env var overrides.
    ///
    /// Falls back to ~/.cronloop/cronloop.toml when no path is given. A
    /// missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(%path, "loading config");

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::CronError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        // Split on "__" rather than "_" so snake_case keys like
        // `run_retention_days` survive the env mapping.
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CRONLOOP_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.cronloop/cronloop.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        // Inside a jail so env overrides set by other tests cannot leak in.
        figment::Jail::expect_with(|_| {
            let config = CronloopConfig::load(Some("/nonexistent/cronloop.toml"))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.worker.queue_capacity, DEFAULT_QUEUE_CAPACITY);
            assert_eq!(config.worker.run_retention_days, DEFAULT_RUN_RETENTION_DAYS);
            assert!(config.database.path.ends_with("cronloop.db"));
            Ok(())
        });
    }

    #[test]
    fn env_overrides_nest_on_double_underscore() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "cronloop.toml",
                r#"
                [worker]
                run_retention_days = 14
                queue_capacity = 64
                "#,
            )?;
            jail.set_env("CRONLOOP_WORKER__RUN_RETENTION_DAYS", "7");
            jail.set_env("CRONLOOP_DATABASE__PATH", "/var/lib/cronloop/jobs.db");
            // A single underscore does not nest, so this key is ignored.
            jail.set_env("CRONLOOP_WORKER_QUEUE_CAPACITY", "9");

            let config = CronloopConfig::load(Some("cronloop.toml")).map_err(|e| e.to_string())?;
            assert_eq!(config.worker.run_retention_days, 7);
            assert_eq!(config.worker.queue_capacity, 64);
            assert_eq!(config.database.path, "/var/lib/cronloop/jobs.db");
            Ok(())
        });
    }

    #[test]
    fn toml_overrides_defaults() {
        let config: CronloopConfig = Figment::new()
            .merge(Toml::string(
                r#"
                [database]
                path = "/tmp/jobs.db"

                [worker]
                run_retention_days = 7
                "#,
            ))
            .extract()
            .unwrap();
        assert_eq!(config.database.path, "/tmp/jobs.db");
        assert_eq!(config.worker.run_retention_days, 7);
        assert_eq!(config.worker.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }
}
