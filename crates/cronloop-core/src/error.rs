use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    /// The job name is not in the registry. Nothing was written or scheduled.
    #[error("Unknown cron job: {name}")]
    Configuration { name: String },

    /// The job function failed. The run record already holds the detail.
    #[error("Cron job {name} failed: {message}")]
    Execution { name: String, message: String },

    /// The queue refused a submission. For a cadence tick the chain is
    /// broken until something re-arms it.
    #[error("Failed to schedule {target}: {reason}")]
    Scheduling { target: String, reason: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CronError {
    /// Short error code string for logs and CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            CronError::Configuration { .. } => "CONFIGURATION_ERROR",
            CronError::Execution { .. } => "EXECUTION_ERROR",
            CronError::Scheduling { .. } => "SCHEDULING_ERROR",
            CronError::Store(_) => "STORE_ERROR",
            CronError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CronError>;
