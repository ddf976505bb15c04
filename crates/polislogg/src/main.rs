//! polislogg - offline-first cache of Swedish police events.
//!
//! `polislogg run` keeps the local cache fresh from polisen.se and trades
//! history with a shared pool; the other commands inspect or drive the
//! cache once.

mod commands;
mod render;

use std::io;
use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::{Context, EventsQuery, Status};

/// Every command opens the cache files directly and the last writer wins.
const CACHE_WRITER_NOTE: &str = "Note: fetch, pull and clear write the cache directory that \
`polislogg run` owns. Stop `polislogg run` before using them, or point them at another \
directory with POLISLOGG_CACHE_DIR; otherwise one process overwrites the other's changes.";

#[derive(Parser)]
#[command(name = "polislogg", version)]
#[command(about = "Cache Swedish police events locally and share the history")]
#[command(after_help = CACHE_WRITER_NOTE)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the feed and sync with the shared pool until interrupted
    Run,
    /// Fetch the current feed once (not while `polislogg run` is active)
    #[command(after_help = CACHE_WRITER_NOTE)]
    Fetch,
    /// List cached events, newest first
    Events {
        /// Only events on or after this day (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only events on or before this day (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Only events that dropped out of the live feed
        #[arg(long, conflicts_with = "current")]
        archived: bool,

        /// Only events still in the live feed
        #[arg(long)]
        current: bool,

        /// Show at most this many events
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show one cached event
    Show { id: i64 },
    /// Summarize the local cache
    Stats {
        /// Also report the shared pool
        #[arg(long)]
        shared: bool,
    },
    /// Pull new records from the shared pool (not while `polislogg run` is active)
    #[command(after_help = CACHE_WRITER_NOTE)]
    Pull {
        /// Ignore the watermark and pull everything
        #[arg(long)]
        force: bool,
    },
    /// Upload the local cache to the shared pool
    Push,
    /// Delete the local cache (not while `polislogg run` is active)
    #[command(after_help = CACHE_WRITER_NOTE)]
    Clear,
    /// Empty the shared pool
    ResetShared,
}

/// Initialize the tracing subscriber for one-shot commands
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// Log to stderr and to a daily file under `<cache_dir>/logs`.
/// The returned guard flushes the file writer when dropped.
fn init_daemon_tracing(cache_dir: &Path) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("polislogg")
        .filename_suffix("log")
        .build(cache_dir.join("logs"))
        .context("Failed to open log directory")?;
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .with(filter)
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = polislogg_core::Config::load()?;

    let _guard = match cli.command {
        Commands::Run => Some(init_daemon_tracing(&config.cache_dir()?)?),
        _ => {
            init_tracing();
            None
        }
    };
    let ctx = Context::open(config)?;

    match cli.command {
        Commands::Run => commands::run::run(ctx).await,
        Commands::Fetch => commands::fetch::run(&ctx).await,
        Commands::Events {
            from,
            to,
            archived,
            current,
            limit,
        } => {
            let status = if archived {
                Status::Archived
            } else if current {
                Status::Current
            } else {
                Status::All
            };
            let query = EventsQuery::new(from, to, status, limit)?;
            commands::events::list(&ctx, &query).await
        }
        Commands::Show { id } => commands::events::show(&ctx, id).await,
        Commands::Stats { shared } => commands::stats::run(&ctx, shared).await,
        Commands::Pull { force } => commands::sync::pull(&ctx, force).await,
        Commands::Push => commands::sync::push(&ctx).await,
        Commands::Clear => commands::clear::run(&ctx).await,
        Commands::ResetShared => commands::sync::reset_shared(&ctx).await,
    }
}
