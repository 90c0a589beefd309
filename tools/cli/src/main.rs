//! Offsync CLI - operate an offline-first replica from the shell.
//!
//! Local edits are written to the replica immediately and queued; `drain`,
//! `pull` and `sync` exchange them with a directory acting as the server of
//! record.

mod config;
mod entities;
mod replica;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use offsync_common::{EntityId, EntityType, Timestamp};
use offsync_sync::{DrainReport, SyncSummary};

use crate::config::{default_config_path, CliConfig};
use crate::entities::{note_type, task_type, Note, Task, NOTE, TASK};
use crate::replica::Replica;

#[derive(Parser)]
#[command(name = "offsync")]
#[command(about = "Offsync - offline-first replica sync")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: <data dir>/offsync/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the replica data directory.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Override the remote directory.
    #[arg(long, global = true)]
    remote_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a note.
    PutNote {
        /// Note id (default: a new id).
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long)]
        title: String,

        #[arg(short, long, default_value = "")]
        body: String,
    },

    /// Create or update a task.
    PutTask {
        /// Task id (default: a new id).
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long)]
        title: String,

        /// Mark the task done.
        #[arg(long)]
        done: bool,
    },

    /// Show one entity from the local replica.
    Get {
        /// Entity type: "note" or "task".
        entity_type: String,
        id: String,
    },

    /// Delete an entity locally and queue the remote delete.
    Delete {
        /// Entity type: "note" or "task".
        entity_type: String,
        id: String,
    },

    /// List queued operations.
    Pending,

    /// Push queued operations to the remote.
    Drain,

    /// Fetch remote changes.
    Pull {
        /// Only pull this entity type.
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,
    },

    /// Drain, then pull every entity type.
    Sync,

    /// List entities in the local replica.
    List {
        /// Only list this entity type.
        #[arg(short = 't', long = "type")]
        entity_type: Option<String>,
    },

    /// Show queue length and pull cursors.
    Status,

    /// Run the sync scheduler until interrupted.
    Run,

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "offsync", &mut std::io::stdout());
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = CliConfig::load(&config_path).await?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = cli.remote_dir {
        config.remote_dir = dir;
    }

    if let Commands::Config = cli.command {
        return cmd_config(&config_path, &config);
    }

    let replica = Replica::open(&config).await?;

    match cli.command {
        Commands::PutNote { id, title, body } => {
            cmd_put_note(&replica, &config, id, title, body).await
        }

        Commands::PutTask { id, title, done } => {
            cmd_put_task(&replica, &config, id, title, done).await
        }

        Commands::Get { entity_type, id } => cmd_get(&replica, &entity_type, &id).await,

        Commands::Delete { entity_type, id } => {
            cmd_delete(&replica, &config, &entity_type, &id).await
        }

        Commands::Pending => cmd_pending(&replica).await,

        Commands::Drain => cmd_drain(&replica).await,

        Commands::Pull { entity_type } => cmd_pull(&replica, entity_type.as_deref()).await,

        Commands::Sync => cmd_sync(&replica).await,

        Commands::List { entity_type } => cmd_list(&replica, entity_type.as_deref()).await,

        Commands::Status => cmd_status(&replica).await,

        Commands::Run => cmd_run(replica).await,

        Commands::Config | Commands::Completions { .. } => Ok(()),
    }
}

/// Parse an entity type argument against the known types.
fn parse_type(name: &str) -> Result<EntityType> {
    match name {
        NOTE => note_type(),
        TASK => task_type(),
        _ => anyhow::bail!("Unknown entity type '{}'. Use: note or task", name),
    }
}

fn entity_id(id: Option<String>) -> EntityId {
    id.map(EntityId::new).unwrap_or_else(EntityId::generate)
}

/// Drain right after a local change when the config asks for it.
async fn drain_if_configured(replica: &Replica, config: &CliConfig) -> Result<()> {
    if config.sync.drain_on_enqueue {
        let report = replica.engine.push().await.context("Failed to drain queue")?;
        print_drain(&report);
    }
    Ok(())
}

fn print_drain(report: &DrainReport) {
    println!(
        "Pushed {} operation(s), discarded {} stale, {} remaining",
        report.processed, report.discarded, report.remaining
    );
    if let Some(halted_on) = report.halted_on {
        println!("  Halted on operation {}", halted_on);
    }
}

fn print_summary(summary: &SyncSummary) {
    if let Some(drain) = &summary.drain {
        print_drain(drain);
    }
    for pull in &summary.pulls {
        let cursor = pull
            .cursor_after
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string());
        println!(
            "Pulled {}: {} updated, {} deleted (cursor: {})",
            pull.entity_type, pull.updated, pull.deleted, cursor
        );
    }
    for (entity_type, reason) in &summary.failed_pulls {
        println!("Pull of {} failed: {}", entity_type, reason);
    }
}

/// Create or update a note.
async fn cmd_put_note(
    replica: &Replica,
    config: &CliConfig,
    id: Option<String>,
    title: String,
    body: String,
) -> Result<()> {
    let note = Note {
        id: entity_id(id),
        title,
        body,
        updated_at: Timestamp::now(),
        deleted_at: None,
    };
    let operation = replica.put_note(note).await?;
    println!("Saved note {} ({})", operation.entity_id, operation);

    drain_if_configured(replica, config).await
}

/// Create or update a task.
async fn cmd_put_task(
    replica: &Replica,
    config: &CliConfig,
    id: Option<String>,
    title: String,
    done: bool,
) -> Result<()> {
    let task = Task {
        id: entity_id(id),
        title,
        done,
        updated_at: Timestamp::now(),
        deleted_at: None,
    };
    let operation = replica.put_task(task).await?;
    println!("Saved task {} ({})", operation.entity_id, operation);

    drain_if_configured(replica, config).await
}

async fn cmd_get(replica: &Replica, entity_type: &str, id: &str) -> Result<()> {
    let id = EntityId::new(id);
    let json = match parse_type(entity_type)?.as_str() {
        NOTE => replica
            .read_note(&id)
            .await?
            .map(|note| serde_json::to_string_pretty(&note)),
        _ => replica
            .read_task(&id)
            .await?
            .map(|task| serde_json::to_string_pretty(&task)),
    };

    match json {
        Some(json) => println!("{}", json?),
        None => println!("No {} with id {}", entity_type, id),
    }
    Ok(())
}

async fn cmd_delete(
    replica: &Replica,
    config: &CliConfig,
    entity_type: &str,
    id: &str,
) -> Result<()> {
    let entity_type = parse_type(entity_type)?;
    let operation = replica.delete(entity_type, EntityId::new(id)).await?;
    println!("Deleted locally, queued {}", operation);

    drain_if_configured(replica, config).await
}

async fn cmd_pending(replica: &Replica) -> Result<()> {
    let pending = replica.coordinator().pending_operations().await?;

    if pending.is_empty() {
        println!("Queue is empty.");
    } else {
        println!("{} pending operation(s):", pending.len());
        for operation in pending {
            println!("  {} queued at {}", operation, operation.created_at);
        }
    }
    Ok(())
}

async fn cmd_drain(replica: &Replica) -> Result<()> {
    let report = replica.engine.push().await.context("Failed to drain queue")?;
    print_drain(&report);

    let state = replica.coordinator().state();
    println!("Status: {}", state.status);
    if let Some(error) = state.last_error {
        println!("  Last error: {}", error);
    }
    Ok(())
}

async fn cmd_pull(replica: &Replica, entity_type: Option<&str>) -> Result<()> {
    let summary = match entity_type {
        Some(name) => {
            let entity_type = parse_type(name)?;
            let report = replica
                .engine
                .pull(&entity_type)
                .await
                .with_context(|| format!("Failed to pull {}", entity_type))?;
            SyncSummary {
                pulls: vec![report],
                ..SyncSummary::default()
            }
        }
        None => {
            let mut summary = SyncSummary::default();
            for (entity_type, result) in replica.engine.pull_all().await {
                match result {
                    Ok(report) => summary.pulls.push(report),
                    Err(e) => summary.failed_pulls.push((entity_type, e.to_string())),
                }
            }
            summary
        }
    };

    print_summary(&summary);
    Ok(())
}

async fn cmd_sync(replica: &Replica) -> Result<()> {
    info!("Starting sync");
    let summary = replica.engine.sync_full().await.context("Sync failed")?;
    print_summary(&summary);
    println!("Completed in {:?}", summary.duration);
    Ok(())
}

async fn cmd_list(replica: &Replica, entity_type: Option<&str>) -> Result<()> {
    let only = entity_type.map(parse_type).transpose()?;
    let wants = |ty: &str| only.as_ref().map_or(true, |only| only.as_str() == ty);

    if wants(NOTE) {
        let notes = replica.list_notes().await?;
        println!("Notes ({}):", notes.len());
        for note in notes {
            println!("  {}  {}  (updated {})", note.id, note.title, note.updated_at);
        }
    }

    if wants(TASK) {
        let tasks = replica.list_tasks().await?;
        println!("Tasks ({}):", tasks.len());
        for task in tasks {
            let mark = if task.done { "x" } else { " " };
            println!(
                "  [{}] {}  {}  (updated {})",
                mark, task.id, task.title, task.updated_at
            );
        }
    }

    Ok(())
}

async fn cmd_status(replica: &Replica) -> Result<()> {
    let pending = replica.coordinator().pending_operations().await?;
    println!("Pending operations: {}", pending.len());

    for entity_type in replica.coordinator().registry().entity_types() {
        let cursor = replica
            .cursor(&entity_type)
            .await?
            .map(|c| c.to_string())
            .unwrap_or_else(|| "never pulled".to_string());
        println!("  {} cursor: {}", entity_type, cursor);
    }
    Ok(())
}

/// Run the scheduler with the configured mode until Ctrl-C.
async fn cmd_run(mut replica: Replica) -> Result<()> {
    let handle = replica.engine.init_scheduler();
    let engine = Arc::new(replica.engine);

    let worker = {
        let engine = engine.clone();
        tokio::spawn(handle.run(move |request| {
            let engine = engine.clone();
            async move { engine.process_request(request).await }
        }))
    };

    let scheduler = engine
        .scheduler()
        .context("Scheduler was not initialized")?;

    info!(
        "Sync loop running ({:?}), press Ctrl-C to stop",
        engine.config().sync_mode
    );
    match scheduler.request_sync().await {
        Ok(summary) => print_summary(&summary),
        Err(e) => println!("Initial sync failed: {}", e),
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    scheduler.shutdown().await;
    worker.await.context("Scheduler task failed")?;
    Ok(())
}

fn cmd_config(path: &std::path::Path, config: &CliConfig) -> Result<()> {
    println!("Config file: {}", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
