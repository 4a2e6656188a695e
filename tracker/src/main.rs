//! POWR CLI
//!
//! Usage:
//!   powr templates --library library.json
//!   powr simulate --template 33402:<pubkey>:leg-day --script session.json
//!   powr simulate --script more.json --resume
//!   powr snapshot show
//!   powr snapshot clear

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};

use powr_common::Address;
use powr_tracker::script::{load_script, run_script};
use powr_tracker::{
    notice_channel, InMemoryStore, LifecyclePhase, ManualClock, NoticeSender, OutboxSigner,
    SessionHandle, SessionNotice, SessionRunner, SessionSnapshot, SnapshotStore, StoreResolver,
    TrackerConfig, WorkoutView,
};

#[derive(Parser)]
#[command(name = "powr")]
#[command(about = "Track strength workouts and publish them as workout records")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the nearest .powr.toml)
    #[arg(long, env = "POWR_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v info, -vv debug, -vvv trace). Default is warn.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List templates in a library file
    Templates {
        /// Library JSON file (`{ "records": [...] }`)
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Run a scripted workout session
    Simulate {
        #[arg(long)]
        library: Option<PathBuf>,

        /// Template address (33402:<pubkey>:<identifier>)
        #[arg(long, required_unless_present = "resume")]
        template: Option<String>,

        /// Script of timed events (JSON array)
        #[arg(long)]
        script: PathBuf,

        /// Continue the saved session instead of starting a new one
        #[arg(long, conflicts_with = "template")]
        resume: bool,
    },
    /// Inspect or discard the saved in-progress session
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
}

#[derive(Subcommand)]
enum SnapshotCommands {
    /// Print the saved session
    Show,
    /// Delete the saved session
    Clear,
}

fn log_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI first to get verbosity before initializing tracing
    let cli = Cli::parse();
    powr_common::init_tracing("powr_tracker", log_level(cli.verbose))?;

    let config = match &cli.config {
        Some(path) => TrackerConfig::load_from_path(path)?,
        None => TrackerConfig::load()?,
    };

    match cli.command {
        Commands::Templates { library } => {
            let path = library.unwrap_or_else(|| config.storage.library_path());
            run_templates(&path).await
        }
        Commands::Simulate {
            library,
            template,
            script,
            resume,
        } => {
            let library = library.unwrap_or_else(|| config.storage.library_path());
            run_simulate(&config, &library, template.as_deref(), &script, resume).await
        }
        Commands::Snapshot { command } => {
            run_snapshot_command(command, &SnapshotStore::new(config.storage.snapshot_path())).await
        }
    }
}

async fn run_templates(library: &Path) -> Result<()> {
    let store = InMemoryStore::from_library_file(library)?;
    let templates = store.templates().await;

    if templates.is_empty() {
        println!("No templates in {}", library.display());
        return Ok(());
    }

    println!("Templates:\n");
    for (address, title) in templates {
        println!("  {} - {}", address, title);
    }
    println!("\nStart one with: powr simulate --template <address> --script <file>");
    Ok(())
}

async fn run_simulate(
    config: &TrackerConfig,
    library: &Path,
    template: Option<&str>,
    script: &Path,
    resume: bool,
) -> Result<()> {
    let steps = load_script(script)?;
    let store = Arc::new(InMemoryStore::from_library_file(library)?);
    let snapshots = SnapshotStore::new(config.storage.snapshot_path());
    let outbox = config.storage.outbox_path();

    let saved = if resume {
        let snapshot = snapshots
            .load()
            .await?
            .context("No saved session to resume; run `powr simulate --template ...` first")?;
        Some(snapshot)
    } else {
        None
    };

    let clock = ManualClock::new(saved.as_ref().map(|s| s.saved_at).unwrap_or_else(Utc::now));
    let (notice_tx, mut notice_rx) = notice_channel();
    let runner = SessionRunner::new(
        Arc::new(StoreResolver::new(store)),
        Arc::new(OutboxSigner::new(&outbox)),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_config(config.runner_config())
    .with_machine_config(config.machine_config())
    .with_notices(NoticeSender::new(notice_tx));

    let handle = match (saved, template) {
        (Some(snapshot), _) => {
            println!("Resuming workout {}", snapshot.session.workout_id);
            runner.resume(snapshot.session)
        }
        (None, Some(template)) => {
            let address: Address = template
                .parse()
                .with_context(|| format!("Invalid template address '{}'", template))?;
            runner.start(address, config.identity.pubkey.clone())
        }
        (None, None) => anyhow::bail!("Either --template or --resume is required"),
    };

    let initial = handle.settled().await?;
    println!("{}", initial.status_line());
    if initial.phase == LifecyclePhase::TemplateError {
        anyhow::bail!("Could not load template: {}", initial.error.unwrap_or_default());
    }

    let outcomes = run_script(&handle, &clock, steps).await?;
    for outcome in &outcomes {
        match &outcome.rejected {
            Some(reason) => println!("{:>3}. {} rejected: {}", outcome.step, outcome.event, reason),
            None => println!("{:>3}. {} -> {}", outcome.step, outcome.event, outcome.view.status_line()),
        }
    }

    while let Ok(notice) = notice_rx.try_recv() {
        match notice {
            SessionNotice::Published { record_id } => {
                println!("Published {} to {}", record_id, outbox.display())
            }
            SessionNotice::PublishFailed {
                attempt,
                reason,
                retries_left,
            } => println!(
                "Publish attempt {} failed: {} ({} retries left)",
                attempt, reason, retries_left
            ),
            _ => {}
        }
    }

    let view = handle.view().await?;
    finish_session(&handle, &snapshots, &view).await?;
    handle.shutdown().await?;
    Ok(())
}

/// Save an unfinished session, drop the snapshot of a finished one
async fn finish_session(
    handle: &SessionHandle,
    snapshots: &SnapshotStore,
    view: &WorkoutView,
) -> Result<()> {
    match view.phase {
        LifecyclePhase::Active | LifecyclePhase::Paused => {
            let snapshot = handle.snapshot().await?;
            snapshots.save(&snapshot).await?;
            println!(
                "Session saved to {}; continue with --resume",
                snapshots.path().display()
            );
        }
        LifecyclePhase::ShowingSummary | LifecyclePhase::Final | LifecyclePhase::Cancelled => {
            snapshots.clear().await?;
            if let Some(summary) = &view.summary {
                println!("\nSummary:\n{}", serde_json::to_string_pretty(summary)?);
            }
        }
        _ => {}
    }
    Ok(())
}

async fn run_snapshot_command(command: SnapshotCommands, snapshots: &SnapshotStore) -> Result<()> {
    match command {
        SnapshotCommands::Show => match snapshots.load().await? {
            Some(SessionSnapshot {
                saved_at, session, ..
            }) => {
                println!("Saved at: {}", saved_at.to_rfc3339());
                println!("{}", serde_json::to_string_pretty(&session)?);
            }
            None => println!("No saved session at {}", snapshots.path().display()),
        },
        SnapshotCommands::Clear => {
            if snapshots.clear().await? {
                println!("Saved session discarded");
            } else {
                println!("No saved session at {}", snapshots.path().display());
            }
        }
    }
    Ok(())
}
