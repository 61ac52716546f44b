use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use wxgate::commands;
use wxgate::config::WxPaths;

#[derive(Parser)]
#[command(name = "wxgate", about = "APRS-IS weather station gateway", version)]
struct Cli {
    /// Path to the station configuration file
    #[arg(long, global = true, default_value = "/config/aprs_config.toml")]
    config: PathBuf,

    /// Path to the packaged default configuration
    #[arg(long, global = true, default_value = "/defaults/aprs_config.toml")]
    defaults: PathBuf,

    /// Path to the weather reading document
    #[arg(long, global = true, default_value = "/config/wx.json")]
    wx_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the supervisor: ingest service plus transmission daemon
    Run {
        /// Bind address for the ingest service
        #[arg(long, default_value = "0.0.0.0:5000")]
        listen: String,
    },
    /// Run the transmission daemon
    Daemon {
        /// Seconds to wait before starting (used by the supervisor to
        /// stagger startup after ingestion)
        #[arg(long, default_value_t = 0)]
        start_delay: u64,
    },
    /// Run the HTTP ingest service
    Ingest {
        /// Bind address
        #[arg(long, default_value = "0.0.0.0:5000")]
        listen: String,
    },
    /// One-shot transmission run
    Send {
        /// Send a test frame with the generic destination
        #[arg(long)]
        test: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if std::env::var("APRS_DEBUG")
        .map(|v| v.to_lowercase() == "yes")
        .unwrap_or(true)
    {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let paths = WxPaths {
        config: cli.config,
        defaults: cli.defaults,
        reading: cli.wx_file,
    };

    match cli.command {
        Commands::Run { listen } => commands::handle_run(paths, listen).await,
        Commands::Daemon { start_delay } => commands::handle_daemon(paths, start_delay).await,
        Commands::Ingest { listen } => commands::handle_ingest(paths, listen).await,
        Commands::Send { test } => commands::handle_send(paths, test).await,
    }
}
