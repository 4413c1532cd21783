//! Witness CLI - Watch HTTP round trips as they happen
//!
//! Usage:
//!   witness watch               Follow the trace stream in a terminal UI
//!   witness watch --plain       Print one line per finished request
//!   witness last-message        Show the last raw stream message
//!   witness demo                Serve a synthetic trace stream
//!   witness config              Show or initialise the config file

mod commands;
mod config;
mod output;
mod tui;
mod viewer;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "witness")]
#[command(author = "Witness Team")]
#[command(version)]
#[command(about = "Watch HTTP round trips as they happen", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the trace stream
    Watch {
        /// Event stream URL (overrides the config file)
        #[arg(short, long, env = "WITNESS_ENDPOINT")]
        endpoint: Option<String>,

        /// Seconds to wait before reconnecting
        #[arg(long)]
        reconnect_delay: Option<u64>,

        /// Print plain lines instead of the terminal UI
        #[arg(long)]
        plain: bool,

        /// Do not keep the last raw message on disk
        #[arg(long)]
        no_persist: bool,

        /// Rows kept on screen before the oldest is dropped
        #[arg(long)]
        max_rows: Option<usize>,
    },

    /// Show the last raw stream message
    LastMessage,

    /// Serve a synthetic trace stream for trying the viewer
    Demo {
        /// Port to listen on
        #[arg(short, long, default_value_t = witness_common::constants::DEFAULT_PORT)]
        port: u16,

        /// Milliseconds between new requests
        #[arg(long, default_value_t = 750)]
        interval_ms: u64,
    },

    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Ensure config directories exist
    config::ensure_dirs()?;

    let tui_mode = matches!(cli.command, Commands::Watch { plain: false, .. });
    init_logging(cli.verbose, tui_mode)?;

    match cli.command {
        Commands::Watch {
            endpoint,
            reconnect_delay,
            plain,
            no_persist,
            max_rows,
        } => {
            let opts = commands::watch::WatchOptions {
                endpoint,
                reconnect_delay,
                plain,
                no_persist,
                max_rows,
            };
            commands::watch::run(opts).await?;
        }

        Commands::LastMessage => {
            commands::last_message::run()?;
        }

        Commands::Demo { port, interval_ms } => {
            commands::demo::run(port, interval_ms).await?;
        }

        Commands::Config { init } => {
            commands::show_config(init)?;
        }
    }

    Ok(())
}

/// Log to stderr, or to a file while the terminal UI owns the screen
fn init_logging(verbose: bool, tui_mode: bool) -> Result<()> {
    let log_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{},witness_cli=info", log_level).into());

    if tui_mode {
        let path = config::logs_dir().join("witness.log");
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open log file {}", path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .without_time()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    Ok(())
}
