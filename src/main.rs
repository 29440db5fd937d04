//! photosift - a resumable photo folder classifier.
//!
//! Usage:
//!   psift [PATH]             Scan (or resume) a photo folder
//!   psift scan [PATH]        Scan with checkpointing options
//!   psift status [PATH]      Show checkpoint state without scanning
//!   psift groups [PATH]      List groups from the last scan
//!   psift reset [PATH]       Delete all checkpoint records
//!   psift --help             Show help

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

use photosift_core::{EngineConfig, GroupSummary, MediaItem, PhotoGroup, ScanPhase, ScanSnapshot};
use photosift_engine::{EngineError, ScanEngine};
use photosift_library::FolderLibrary;
use photosift_store::CheckpointStore;

/// Default checkpoint directory inside the scanned folder. Hidden, so
/// enumeration never picks up its own records.
const STATE_DIR_NAME: &str = ".photosift";

#[derive(Parser)]
#[command(
    name = "photosift",
    version,
    about = "A resumable photo folder classifier",
    long_about = "photosift fingerprints every photo in a folder and sorts them into\n\
                  ten stable groups. Scans checkpoint as they go: interrupt with \
                  Ctrl-C\nand the next run picks up where it left off."
)]
struct Cli {
    /// Path to scan (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a photo folder, resuming from a checkpoint when one exists
    Scan {
        /// Path to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Checkpoint directory (defaults to PATH/.photosift)
        #[arg(short, long)]
        state_dir: Option<PathBuf>,

        /// Photos between durable checkpoints
        #[arg(short, long, default_value = "50")]
        batch_size: u64,

        /// Discard any existing checkpoint and scan from zero
        #[arg(long)]
        fresh: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Show checkpoint state without scanning
    Status {
        /// Path the checkpoint belongs to
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Checkpoint directory (defaults to PATH/.photosift)
        #[arg(short, long)]
        state_dir: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// List groups from the last scan
    Groups {
        /// Path the checkpoint belongs to
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Checkpoint directory (defaults to PATH/.photosift)
        #[arg(short, long)]
        state_dir: Option<PathBuf>,

        /// Show only this group ("a" through "j", or "others")
        #[arg(short, long)]
        group: Option<String>,

        /// List member photos, not just counts
        #[arg(short, long)]
        ids: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete all checkpoint records
    Reset {
        /// Path the checkpoint belongs to
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Checkpoint directory (defaults to PATH/.photosift)
        #[arg(short, long)]
        state_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Scan {
            path,
            state_dir,
            batch_size,
            fresh,
            format,
        }) => {
            run_scan(&path, state_dir, batch_size, fresh, format).await?;
        }
        Some(Command::Status {
            path,
            state_dir,
            format,
        }) => {
            run_status(&path, state_dir, format)?;
        }
        Some(Command::Groups {
            path,
            state_dir,
            group,
            ids,
            format,
        }) => {
            run_groups(&path, state_dir, group, ids, format).await?;
        }
        Some(Command::Reset { path, state_dir }) => {
            run_reset(&path, state_dir)?;
        }
        None => {
            let batch_size = EngineConfig::default().batch_size;
            run_scan(&cli.path, None, batch_size, false, OutputFormat::Text).await?;
        }
    }

    Ok(())
}

/// Engine warnings surface by default. Override via RUST_LOG.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run a scan (or resume one) and display the group summary.
async fn run_scan(
    path: &Path,
    state_dir: Option<PathBuf>,
    batch_size: u64,
    fresh: bool,
    format: OutputFormat,
) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let store = open_store(&path, state_dir)?;
    let config = EngineConfig::builder()
        .batch_size(batch_size)
        .build()
        .context("Invalid batch size")?;
    let engine = ScanEngine::with_config(FolderLibrary::new(&path), store, config);

    if fresh {
        engine.reset().context("Reset failed")?;
    }

    if engine.can_resume() {
        let snapshot = engine.snapshot();
        eprintln!(
            "Resuming {} from checkpoint ({}/{} photos done)...",
            path.display(),
            snapshot.processed,
            snapshot.total
        );
    } else {
        eprintln!("Scanning {}...", path.display());
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!();
                eprintln!(
                    "Interrupted, suspending after the current photo (Ctrl-C again to abort)"
                );
                cancel.cancel();
                if tokio::signal::ctrl_c().await.is_ok() {
                    std::process::exit(130);
                }
            }
        });
    }

    let renderer = match format {
        OutputFormat::Text => Some(tokio::spawn(render_progress(engine.subscribe()))),
        OutputFormat::Json => None,
    };

    let started = Instant::now();
    let result = engine.start(&cancel).await;

    if let Some(task) = renderer {
        // The engine outlives the scan call, so the receiver never
        // closes on its own.
        task.abort();
        let _ = task.await;
        eprintln!();
    }

    let snapshot = match result {
        Ok(snapshot) => snapshot,
        Err(EngineError::AlreadyCompleted) => {
            eprintln!("Previous scan already completed; use --fresh to rescan from zero.");
            engine.snapshot()
        }
        Err(err) => return Err(err).context("Scan failed"),
    };

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {} - {} photos", path.display(), snapshot.total);
            match snapshot.phase {
                ScanPhase::Completed => {
                    println!(" Completed in {:.2}s", started.elapsed().as_secs_f64());
                }
                ScanPhase::Suspended => {
                    println!(
                        " Suspended at {}/{} photos ({:.0}%), run again to resume",
                        snapshot.processed,
                        snapshot.total,
                        snapshot.progress * 100.0
                    );
                }
                _ => {}
            }
            println!("{}", "─".repeat(60));
            println!();
            print_summary(&engine.summary());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

/// Show the persisted scan state without touching the library.
fn run_status(path: &Path, state_dir: Option<PathBuf>, format: OutputFormat) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let store = open_store(&path, state_dir)?;
    let store_dir = store.dir().to_path_buf();
    let engine = ScanEngine::new(FolderLibrary::new(&path), store);
    let snapshot = engine.snapshot();

    match format {
        OutputFormat::Text => {
            println!();
            println!("{}", "─".repeat(60));
            println!(" {}", path.display());
            println!("{}", "─".repeat(60));
            println!();
            println!(" Phase:      {}", snapshot.phase);
            println!(
                " Progress:   {}/{} photos ({:.0}%)",
                snapshot.processed,
                snapshot.total,
                snapshot.progress * 100.0
            );
            if snapshot.can_resume {
                println!(" Resumable:  yes, `psift scan` continues from the checkpoint");
            }
            if let Some(date) = snapshot.last_scan {
                println!(" Last scan:  {}", date.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!(" Store:      {}", store_dir.display());
            println!();
            print_summary(&engine.summary());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}

/// List groups, rehydrating membership from the checkpoint when the
/// listing needs photo identifiers.
async fn run_groups(
    path: &Path,
    state_dir: Option<PathBuf>,
    group: Option<String>,
    ids: bool,
    format: OutputFormat,
) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let store = open_store(&path, state_dir)?;
    let engine = ScanEngine::new(FolderLibrary::new(&path), store);

    let filter = group.as_deref().map(parse_group).transpose()?;
    let list_ids = ids || filter.is_some();
    if list_ids {
        engine.rehydrate().await;
    }

    let mut rows = engine.summary();
    if let Some(bucket) = filter {
        rows.retain(|row| row.group == bucket);
    }

    match format {
        OutputFormat::Text => {
            println!();
            if rows.is_empty() {
                println!(" No photos classified yet.");
            } else if list_ids {
                for row in &rows {
                    print_bucket(&row.display_name(), &engine.group_items(row.group));
                }
            } else {
                print_summary(&rows);
            }
        }
        OutputFormat::Json => {
            if list_ids {
                let mut buckets = serde_json::Map::new();
                for row in &rows {
                    let ids: Vec<String> = engine
                        .group_items(row.group)
                        .iter()
                        .map(|item| item.id.to_string())
                        .collect();
                    let label = match row.group {
                        Some(group) => group.to_string(),
                        None => "others".to_string(),
                    };
                    buckets.insert(label, serde_json::json!(ids));
                }
                let value = serde_json::Value::Object(buckets);
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            }
        }
    }

    Ok(())
}

/// Delete all checkpoint records for a folder.
fn run_reset(path: &Path, state_dir: Option<PathBuf>) -> Result<()> {
    let path = path.canonicalize().context("Invalid path")?;
    let store = open_store(&path, state_dir)?;
    let engine = ScanEngine::new(FolderLibrary::new(&path), store);
    engine.reset().context("Reset failed")?;
    println!("Cleared all classification data for {}.", path.display());
    Ok(())
}

/// Render live scan progress to stderr, one line redrawn in place.
async fn render_progress(mut rx: broadcast::Receiver<ScanSnapshot>) {
    loop {
        let snapshot = match rx.recv().await {
            Ok(snapshot) => snapshot,
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        };
        match snapshot.phase {
            ScanPhase::RequestingAccess => {
                eprint!("\rRequesting library access...");
            }
            ScanPhase::Scanning => {
                eprint!(
                    "\r{} {:>3.0}%  {}/{} photos",
                    make_bar(snapshot.progress, 30),
                    snapshot.progress * 100.0,
                    snapshot.processed,
                    snapshot.total
                );
            }
            _ => {}
        }
    }
}

/// Print the group overview with proportional bars.
fn print_summary(rows: &[GroupSummary]) {
    if rows.is_empty() {
        println!(" No photos classified yet.");
        return;
    }
    let max = rows.iter().map(|row| row.count).max().unwrap_or(1);
    for row in rows {
        let bar_len = ((row.count as f64 / max as f64) * 30.0) as usize;
        println!(
            "   {:<10} {:>8} photos  {}",
            row.display_name(),
            row.count,
            "█".repeat(bar_len)
        );
    }
    println!();
}

/// Print one bucket with its member photos.
fn print_bucket(name: &str, items: &[MediaItem]) {
    println!(" {} ({} photos)", name, items.len());
    for item in items {
        println!("   {}", item.id);
    }
    println!();
}

/// Create a simple ASCII bar.
fn make_bar(ratio: f64, width: usize) -> String {
    let filled = (ratio * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(empty))
}

/// Open the checkpoint store, defaulting to a hidden directory inside
/// the scanned folder.
fn open_store(path: &Path, state_dir: Option<PathBuf>) -> Result<CheckpointStore> {
    let dir = state_dir.unwrap_or_else(|| path.join(STATE_DIR_NAME));
    CheckpointStore::open(dir).context("Could not open checkpoint store")
}

/// Parse a group label ("a" through "j", or "others").
fn parse_group(s: &str) -> Result<Option<PhotoGroup>> {
    let lowered = s.trim().to_lowercase();
    if lowered == "others" || lowered == "other" {
        return Ok(None);
    }
    PhotoGroup::iter()
        .find(|group| group.to_string() == lowered)
        .map(Some)
        .ok_or_else(|| eyre!("Unknown group '{}' (expected a-j or 'others')", s))
}
