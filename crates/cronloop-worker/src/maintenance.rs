//! Jobs the worker registers on its own behalf.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::info;

use cronloop_core::Cadence;
use cronloop_scheduler::{Clock, JobFailure, JobResult, JobStore, RegistryBuilder};

pub const PRUNE_RUN_HISTORY: &str = "prune_run_history";

/// Register the built-in housekeeping jobs.
pub fn register(
    builder: &mut RegistryBuilder,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    retention_days: u32,
) {
    builder.register(
        PRUNE_RUN_HISTORY,
        move || prune_run_history(store.as_ref(), clock.as_ref(), retention_days),
        Cadence::Daily,
        format!("Delete finished runs older than {retention_days} days"),
    );
}

/// Drop finished runs completed more than `retention_days` ago. Runs still in
/// progress are never touched.
fn prune_run_history(store: &dyn JobStore, clock: &dyn Clock, retention_days: u32) -> JobResult {
    let cutoff = clock.now() - Duration::days(i64::from(retention_days));
    let pruned = store
        .prune_runs(cutoff)
        .map_err(|e| JobFailure::new(format!("pruning runs before {cutoff}: {e}")))?;
    info!(pruned, %cutoff, "run history pruned");
    Ok(json!({ "pruned_count": pruned }))
}
