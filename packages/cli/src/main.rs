//! bgworker - background job worker CLI

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use db::SurrealStore;
use db::repositories::{JobFilter, JobRepository, QueueRepository};
use queue_core::{JobDescriptor, JobEvent, JobId, JobStatus, JobStore, QueueStore, WorkerExit};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use worker::{WorkerDeps, WorkerMessage, spawn_worker};

use crate::config::Settings;

#[derive(Parser)]
#[command(name = "bgworker", version, about = "Background job worker")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(
        long,
        env = "BGWORKER_CONFIG",
        default_value = "bgworker.toml",
        global = true
    )]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Process jobs from a queue until the execution budget runs out
    Start {
        /// Queue to bind to
        queue: String,
        /// Seconds before the worker exits by itself, 0 to run forever
        #[arg(long)]
        max_execution_time: Option<u64>,
        /// Milliseconds to wait after finding the queue empty
        #[arg(long)]
        idle_delay_ms: Option<u64>,
    },
    /// Add a job to a queue and print its id
    Enqueue {
        queue: String,
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
        /// Metadata entry, repeatable
        #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_key_val)]
        meta: Vec<(String, String)>,
    },
    /// List known queues with their pending job counts
    Queues,
    /// Print a job record as JSON
    Show { job_id: String },
    /// List job records
    List {
        #[arg(long)]
        queue: Option<String>,
        /// new, running, completed or failed
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show job counts for a queue
    Stats { queue: String },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
    }
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::parse(s).ok_or_else(|| format!("unknown status `{}`", s))
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Mirror worker events under the `bgworker::events` target until the
/// worker drops its sender.
async fn log_events(mut rx: broadcast::Receiver<JobEvent>) -> u64 {
    let mut seen = 0;
    loop {
        match rx.recv().await {
            Ok(event) => {
                seen += 1;
                tracing::debug!(
                    target: "bgworker::events",
                    queue = event.queue(),
                    job_id = event.job_id().map(|id| id.to_string()),
                    "{}",
                    event.description()
                );
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(target: "bgworker::events", "{} event(s) dropped", missed);
            }
            Err(RecvError::Closed) => return seen,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let settings = Settings::load(&cli.config)?;
    let db_config = settings.db_config();
    if !db_config.is_persistent() {
        tracing::warn!(
            "{} is private to this process, jobs are gone when it exits",
            db_config.endpoint
        );
    }
    db::init(db_config)
        .await
        .context("failed to connect to the job database")?;
    let store = SurrealStore::new();
    store
        .register_queues(settings.queues.iter().cloned())
        .await
        .context("failed to register queues")?;

    match cli.command {
        Commands::Start {
            queue,
            max_execution_time,
            idle_delay_ms,
        } => {
            let config = settings.worker_config(&queue, max_execution_time, idle_delay_ms);
            let (event_tx, event_rx) = broadcast::channel(256);
            tokio::spawn(log_events(event_rx));
            let deps = WorkerDeps::new(Arc::new(store), Arc::new(settings.runnables()))
                .with_event_tx(event_tx);
            let worker = spawn_worker(config, deps).await?;

            let actor = worker.actor().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping after the current job");
                    let _ = actor.send_message(WorkerMessage::Shutdown);
                }
            });

            // Both ways of stopping are graceful and exit 0.
            let exit: WorkerExit = worker.wait().await?;
            tracing::debug!("worker exited: {}", exit);
        }

        Commands::Enqueue {
            queue,
            command,
            args,
            meta,
        } => {
            let descriptor = meta.into_iter().fold(
                JobDescriptor::new(queue, command).with_args(args),
                |d, (key, value)| d.with_metadata(key, value),
            );
            let id = store.enqueue(descriptor).await?;
            println!("{}", id);
        }

        Commands::Queues => {
            for queue in QueueRepository::list().await? {
                let pending = QueueRepository::pending_count(&queue.name).await?;
                match queue.description {
                    Some(description) => println!("{}\t{}\t{}", queue.name, pending, description),
                    None => println!("{}\t{}", queue.name, pending),
                }
            }
        }

        Commands::Show { job_id } => {
            let id = JobId::parse(&job_id).with_context(|| format!("invalid job id `{}`", job_id))?;
            let Some(record) = store.get(id).await? else {
                bail!("job {} not found", id);
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::List {
            queue,
            status,
            limit,
        } => {
            let records = JobRepository::list(JobFilter {
                queue,
                status,
                limit: Some(limit),
            })
            .await?;
            for record in records {
                println!(
                    "{}\t{}\t{}\t{}",
                    record.id,
                    record.queue,
                    record.status,
                    record.command_line()
                );
            }
        }

        Commands::Stats { queue } => {
            if !store.list_queues().await?.contains(&queue) {
                bail!("queue `{}` does not exist", queue);
            }
            let stats = JobRepository::get_queue_stats(&queue).await?;
            println!("pending\t{}", stats.pending);
            println!("running\t{}", stats.running);
            println!("completed\t{}", stats.completed);
            println!("failed\t{}", stats.failed);
            if let Some(rate) = stats.success_rate() {
                println!("success_rate\t{:.1}%", rate);
            }
        }
    }

    Ok(())
}
