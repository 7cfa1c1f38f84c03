//! `cronloop-core`: types shared by every cronloop crate (the job/run data
//! model, the error taxonomy and the worker configuration).

pub mod config;
pub mod error;
pub mod types;

pub use error::{CronError, Result};
pub use types::{Cadence, Job, JobId, JobStatus, Run, RunId, RunStatus, StatusTransition};
