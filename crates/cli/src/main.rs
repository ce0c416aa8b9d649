//! dirwatch CLI - folder watching from the command line
//!
//! This binary watches a directory and logs every change it is subscribed to.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dirwatch_core::config::Config;
use dirwatch_watcher::{
    EventKind, EventKindSet, FolderWatcher, Handlers, NotifyBackend, WatcherConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dirwatch")]
#[command(about = "Watch a folder and report file and folder changes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory until interrupted
    Watch {
        /// Directory to watch
        dir: PathBuf,

        /// Include subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Event kinds to report, comma separated (default: all)
        #[arg(short, long, value_delimiter = ',', value_name = "KINDS")]
        events: Vec<EventKind>,

        /// Scan the directory on an interval instead of using native notifications
        #[arg(long, value_name = "MS")]
        poll_interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose)?;

    match cli.command {
        Commands::Watch {
            dir,
            recursive,
            events,
            poll_interval_ms,
        } => {
            watch(
                &dir,
                recursive,
                event_mask(&events),
                poll_interval_ms,
                cli.config.as_deref(),
            )
            .await
        }
    }
}

/// Initialize logging system
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "dirwatch_watcher={level},dirwatch_core={level},{}={level}",
            env!("CARGO_PKG_NAME")
        ))
        .init();

    Ok(())
}

/// Union of the requested kinds; none requested means all
fn event_mask(events: &[EventKind]) -> EventKindSet {
    if events.is_empty() {
        return EventKind::all();
    }
    events
        .iter()
        .fold(EventKindSet::empty(), |mask, kind| mask | *kind)
}

fn logging_handlers() -> Handlers {
    Handlers::new()
        .on_file_added(|p| info!(path = %p.display(), "file added"))
        .on_file_removed(|p| info!(path = %p.display(), "file removed"))
        .on_file_modified(|p| info!(path = %p.display(), "file modified"))
        .on_file_renamed(|old, new| {
            info!(from = %old.display(), to = %new.display(), "file renamed")
        })
        .on_folder_added(|p| info!(path = %p.display(), "folder added"))
        .on_folder_removed(|p| info!(path = %p.display(), "folder removed"))
        .on_folder_modified(|p| info!(path = %p.display(), "folder modified"))
        .on_folder_renamed(|old, new| {
            info!(from = %old.display(), to = %new.display(), "folder renamed")
        })
}

/// Watch `dir` until Ctrl-C
async fn watch(
    dir: &Path,
    recursive: bool,
    mask: EventKindSet,
    poll_interval_ms: Option<u64>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    config.validate()?;

    let dir = dir
        .canonicalize()
        .with_context(|| format!("Cannot watch {}", dir.display()))?;

    let watcher_config = WatcherConfig::from(&config.watch);
    let mut watcher = FolderWatcher::new(watcher_config, logging_handlers());
    if let Some(ms) = poll_interval_ms {
        watcher = watcher.with_backend(Arc::new(NotifyBackend::polling(Duration::from_millis(ms))));
    }

    watcher
        .start_watching(&dir, recursive, mask)
        .await
        .with_context(|| format!("Failed to start watching {}", dir.display()))?;
    info!("Watching {} (press Ctrl-C to stop)", dir.display());

    let mut health = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
            _ = health.tick() => {
                if !watcher.is_listening() {
                    warn!("Watch is no longer dispatching, shutting down");
                    break;
                }
            }
        }
    }

    watcher.stop_watching().await;
    let stats = watcher.stats();
    info!(
        queued = stats.queued,
        dispatched = stats.dispatched,
        filtered = stats.filtered,
        coalesced = stats.coalesced,
        source_restarts = stats.source_restarts,
        "Stopped"
    );
    Ok(())
}
