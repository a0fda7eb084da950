//! # isync CLI
//!
//! The `isync` binary keeps a hosted intent-recognition model in step with a
//! local corpus of intent files.
//!
//! ## Usage
//!
//! ```bash
//! isync --config ./config/isync.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `isync init` | Create the SQLite database and run schema migrations |
//! | `isync status` | Show corpus hash, stored fingerprint and remote timestamp |
//! | `isync build` | Print the model payload the next sync would import |
//! | `isync sync` | Import, train and publish when the corpus or remote drifted |
//!
//! Set `RUST_LOG` to control log verbosity (defaults to `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use intent_sync::progress::ProgressMode;
use intent_sync::{config, migrate, status, sync};

/// Sync a local intent corpus to a hosted NLU authoring service.
#[derive(Parser)]
#[command(name = "isync", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/isync.toml`.
    #[arg(long, global = true, default_value = "./config/isync.toml")]
    config: PathBuf,

    /// Enable debug logging unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Show whether the remote model is in sync with the corpus.
    ///
    /// Read-only. A remote lookup failure is reported, not fatal.
    Status,

    /// Print the model payload built from the corpus as JSON.
    ///
    /// Fetches app metadata from the provider but changes nothing.
    Build,

    /// Run a sync pass.
    ///
    /// Skips all remote writes when the corpus hash and remote timestamp
    /// match the last successful sync. Exits non-zero if the pass fails.
    Sync {
        /// Rebuild and re-import even when nothing changed.
        #[arg(long)]
        force: bool,

        /// Publish to the production slot instead of staging.
        #[arg(long)]
        production: bool,

        /// Training progress output: `off`, `human` or `json`.
        ///
        /// Defaults to `human` on a terminal and `off` otherwise.
        #[arg(long, value_parser = parse_progress)]
        progress: Option<ProgressMode>,
    },
}

fn parse_progress(value: &str) -> Result<ProgressMode, String> {
    ProgressMode::parse(value)
        .ok_or_else(|| format!("invalid progress mode '{}': expected off, human or json", value))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Status => {
            status::run_status(&cfg).await?;
        }
        Commands::Build => {
            status::run_build(&cfg).await?;
        }
        Commands::Sync {
            force,
            production,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            sync::run_sync(&cfg, force, production, progress).await?;
        }
    }

    Ok(())
}
