//! voicecache - command-line front end for the offline asset cache.
//!
//! Installs, activates and serves from a versioned cache of a static site's
//! assets, using an on-disk cache directory.

mod cli;
mod session;

use std::io;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};
use session::Session;
use voicecache_core::Config;

/// Log file name prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "voicecache.log";

/// Initialize the tracing subscriber for logging.
/// Use RUST_LOG to control the level (e.g. RUST_LOG=voicecache_core=debug).
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let (mut config, load_error) = match cli.config {
        Some(ref path) => (Config::load_from(path)?, None),
        None => match Config::load() {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        },
    };
    config.apply_env();
    cli.apply_to(&mut config);

    let _guard = init_tracing(config.log_dir.as_deref());
    if let Some(e) = load_error {
        warn!(error = %e, "Failed to load config, using defaults");
    }
    info!(version = %config.version, origin = ?config.origin, "voicecache starting");

    let mut session = Session::open(config)?;
    match cli.command {
        Commands::Update { wait, message } => session.update(wait, message.as_deref()).await,
        Commands::Fetch {
            target,
            method,
            include,
        } => session.fetch(&target, &method, include, &mut std::io::stdout()).await,
        Commands::Status { entries, json } => session.status(entries, json).await,
        Commands::Purge => session.purge().await,
    }
}
