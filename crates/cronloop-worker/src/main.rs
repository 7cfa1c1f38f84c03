use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use cronloop_core::{config::CronloopConfig, Cadence, Job, JobStatus};
use cronloop_scheduler::{
    next_boundary, Clock, CronEngine, JobStore, LocalQueue, Registry, Runner, Scheduler,
    SqliteStore, SystemClock,
};

mod maintenance;

#[derive(Parser)]
#[command(name = "cronloop-worker")]
#[command(version)]
#[command(about = "Self-rescheduling cron worker", long_about = None)]
struct Cli {
    /// Config file (defaults to $CRONLOOP_CONFIG, then ~/.cronloop/cronloop.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Arm every cadence and execute ticks until Ctrl-C
    Serve,
    /// List persisted jobs with their current status
    Jobs,
    /// Show the most recent runs of a job
    Runs {
        name: String,
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show the status change log of a job
    Transitions { name: String },
    /// Print the next boundary of one cadence, or of all of them
    Next { cadence: Option<Cadence> },
    /// Run a registered job once, right now
    Run { name: String },
    /// Mark a job deprecated; later runs no longer change its status
    Deprecate { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cronloop_worker=info,cronloop_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // config: --config > CRONLOOP_CONFIG env > ~/.cronloop/cronloop.toml
    let config_path = cli.config.or_else(|| std::env::var("CRONLOOP_CONFIG").ok());
    let config = CronloopConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        CronloopConfig::default()
    });

    if let Command::Next { cadence } = cli.command {
        print_next(cadence, Utc::now());
        return Ok(());
    }

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = rusqlite::Connection::open(db_path)
        .with_context(|| format!("opening database at {db_path}"))?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    let store: Arc<dyn JobStore> = Arc::new(SqliteStore::new(conn)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Serve => serve(&config, store, clock).await,
        Command::Jobs => print_jobs(store.as_ref()),
        Command::Runs { name, limit } => print_runs(store.as_ref(), &name, limit),
        Command::Transitions { name } => print_transitions(store.as_ref(), &name),
        Command::Run { name } => run_once(&config, store, clock, &name).await,
        Command::Deprecate { name } => deprecate(store.as_ref(), clock.as_ref(), &name),
        Command::Next { .. } => Ok(()),
    }
}

fn build_registry(config: &CronloopConfig, store: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> Registry {
    let mut builder = Registry::builder();
    maintenance::register(&mut builder, store, clock, config.worker.run_retention_days);
    builder.build()
}

fn build_runner(
    config: &CronloopConfig,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
) -> (Arc<Runner>, tokio::sync::mpsc::Receiver<cronloop_scheduler::QueuedTask>) {
    let registry = build_registry(config, Arc::clone(&store), Arc::clone(&clock));
    let (queue, rx) = LocalQueue::new(
        tokio::runtime::Handle::current(),
        config.worker.queue_capacity,
    );
    let scheduler = Arc::new(Scheduler::new(Arc::new(queue), clock));
    (Arc::new(Runner::new(Arc::new(registry), store, scheduler)), rx)
}

async fn serve(config: &CronloopConfig, store: Arc<dyn JobStore>, clock: Arc<dyn Clock>) -> anyhow::Result<()> {
    let (runner, rx) = build_runner(config, store, clock);
    info!(jobs = runner.registry().len(), "registry built");

    let engine = CronEngine::new(Arc::clone(&runner), rx);
    engine.bootstrap()?;
    for tick in runner.scheduler().armed() {
        info!(cadence = %tick.cadence, at = %tick.at, "first tick");
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = tokio::spawn(engine.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    // signal the engine to stop
    let _ = shutdown_tx.send(true);
    worker.await?;
    Ok(())
}

async fn run_once(
    config: &CronloopConfig,
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    name: &str,
) -> anyhow::Result<()> {
    // The receiver stays alive so the re-arm is accepted; the armed tick only
    // matters to a long-running `serve` and is dropped on exit.
    let (runner, _rx) = build_runner(config, store, clock);
    let job_name = name.to_string();
    let runner_for_job = Arc::clone(&runner);
    let result = tokio::task::spawn_blocking(move || runner_for_job.run_cron(&job_name)).await?;

    match result {
        Ok(data) => {
            println!("{name}: succeeded");
            if !data.is_null() {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            Ok(())
        }
        Err(e) => bail!("{name}: {} ({})", e, e.code()),
    }
}

fn deprecate(store: &dyn JobStore, clock: &dyn Clock, name: &str) -> anyhow::Result<()> {
    let job = find_job(store, name)?;
    match store.update_job_status(&job.id, JobStatus::Deprecated, clock.now())? {
        Some(t) => println!("{name}: {} -> {}", t.old_value, t.new_value),
        None => println!("{name}: already deprecated"),
    }
    Ok(())
}

fn find_job(store: &dyn JobStore, name: &str) -> anyhow::Result<Job> {
    store
        .get_job(name)?
        .with_context(|| format!("no job named {name} has run yet"))
}

fn print_jobs(store: &dyn JobStore) -> anyhow::Result<()> {
    let jobs = store.list_jobs()?;
    if jobs.is_empty() {
        println!("no jobs recorded yet");
        return Ok(());
    }
    println!(
        "{:<28} {:<18} {:<11} {:<26} IN STATUS FOR",
        "NAME", "CADENCE", "STATUS", "LAST RUN"
    );
    for job in &jobs {
        println!(
            "{:<28} {:<18} {:<11} {:<26} {}",
            job.name,
            job.cadence.as_str(),
            job.status.as_str(),
            fmt_ts(job.latest_run_date),
            job.time_since_status_change(),
        );
    }
    Ok(())
}

fn print_runs(store: &dyn JobStore, name: &str, limit: usize) -> anyhow::Result<()> {
    let job = find_job(store, name)?;
    for run in store.list_runs(&job.id, limit)? {
        let detail = match (&run.data, run.error.is_empty()) {
            (_, false) => run.error.clone(),
            (Some(data), true) => data.to_string(),
            (None, true) => String::new(),
        };
        println!(
            "{}  {:<11} {:<26} {:<26} {}",
            run.id,
            run.status.as_str(),
            fmt_ts(Some(run.created_at)),
            fmt_ts(run.completion_date),
            detail
        );
    }
    Ok(())
}

fn print_transitions(store: &dyn JobStore, name: &str) -> anyhow::Result<()> {
    let job = find_job(store, name)?;
    for t in store.list_transitions(&job.id)? {
        println!(
            "{:<26} {} -> {}",
            fmt_ts(Some(t.created_at)),
            t.old_value,
            t.new_value
        );
    }
    Ok(())
}

fn print_next(cadence: Option<Cadence>, now: DateTime<Utc>) {
    let cadences: Vec<Cadence> = match cadence {
        Some(c) => vec![c],
        None => Cadence::ALL.to_vec(),
    };
    for c in cadences {
        println!("{:<18} {}", c.as_str(), next_boundary(c, now).to_rfc3339());
    }
}

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
