// src/main.rs

//! Entry point: CLI flags, logging, and handing off to `server::run`.

use anyhow::Result;
use clap::Parser;
use foliokv::config::Config;
use foliokv::server;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "An append-only key/value server with file-stream replication and slot migration.")]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Overrides the listen port from the config file.
    #[arg(long)]
    port: Option<u16>,

    /// Overrides the listen host from the config file.
    #[arg(long)]
    host: Option<String>,

    /// Overrides the data directory from the config file.
    #[arg(long)]
    data_dir: Option<String>,

    /// Overrides the log level from the config file (e.g. "info", "debug").
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration from '{}': {e}", cli.config);
            std::process::exit(1);
        }
    };

    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(log_level) = cli.log_level {
        config.log_level = log_level;
    }

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .compact()
        .with_ansi(true)
        .init();

    if let Err(e) = server::run(config).await {
        error!(error = %e, "server exited with an error");
        return Err(e);
    }
    Ok(())
}
