//! bluekit CLI - scan and inspect BLE peripherals

mod cli;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;

use bluekit::{AdapterRegistry, ClientConfig};
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_configuration(cli.config.as_deref())?;
    let registry = AdapterRegistry::new().with_config(config);

    match cli.command {
        Command::Adapters => commands::adapters(&registry).await,
        Command::Scan {
            timeout_ms,
            adapter,
        } => commands::scan_command(&registry, timeout_ms, adapter).await,
        Command::Info {
            address,
            timeout_ms,
        } => commands::info(&registry, &address, timeout_ms).await,
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();
}

/// Load client timeouts from a TOML file, or use defaults
fn load_configuration(path: Option<&str>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path))?;
            toml::from_str(&text).with_context(|| format!("parsing config file {}", path))
        }
        None => Ok(ClientConfig::default()),
    }
}
