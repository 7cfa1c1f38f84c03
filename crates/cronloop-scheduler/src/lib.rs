//! `cronloop-scheduler`: self-rescheduling cron engine.
//!
//! # Overview
//!
//! Jobs are registered once at startup in an immutable [`Registry`]. Each
//! cadence with registered jobs keeps exactly one pending entry on a
//! [`Queue`]; when it fires, [`Runner::dispatch`] runs every job of the
//! cadence through [`Runner::run_cron`] and arms the following boundary.
//! No external cron daemon is involved: every execution re-arms its
//! successor.
//!
//! Outcomes are persisted through a [`JobStore`] ([`SqliteStore`] ships
//! here): one row per job with a rolling status, an append-only run history
//! and an audit row for every actual status change.
//!
//! # Cadence boundaries (UTC)
//!
//! | Cadence             | Next boundary strictly after `now`   |
//! |---------------------|--------------------------------------|
//! | `every_minute`      | next whole minute                    |
//! | `every_ten_minutes` | next minute divisible by 10          |
//! | `hourly`            | next top of the hour                 |
//! | `daily`             | next midnight                        |
//! | `weekly`            | next Sunday midnight                 |
//! | `monthly`           | midnight on the 1st of next month    |

pub mod clock;
pub mod db;
pub mod engine;
pub mod error;
pub mod queue;
pub mod registry;
pub mod runner;
pub mod schedule;
pub mod scheduler;
pub mod sqlite;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::CronEngine;
pub use error::{QueueError, StoreError};
pub use queue::{LocalQueue, Queue, QueuedTask, TaskHandle, TaskPayload};
pub use registry::{CronTask, JobFailure, JobResult, RegisteredJob, Registry, RegistryBuilder};
pub use runner::Runner;
pub use schedule::next_boundary;
pub use scheduler::{ArmedTick, Scheduler};
pub use sqlite::SqliteStore;
pub use store::{JobStore, RunOutcome};
