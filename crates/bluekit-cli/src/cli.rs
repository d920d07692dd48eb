//! Command-line argument definitions

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bluekit", about = "BLE scanner and device inspector", version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Optional TOML file with client timeouts
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List Bluetooth adapters and the enablement state
    Adapters,

    /// Scan for nearby peripherals
    Scan {
        /// Scan duration in milliseconds; defaults to the configured
        /// scan_timeout
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Index of the adapter to scan with
        #[arg(long, default_value_t = 0)]
        adapter: usize,
    },

    /// Connect to a peripheral and dump its GATT tree
    Info {
        /// Peripheral address as shown by `scan`
        address: String,

        /// Scan duration used to find the device, in milliseconds;
        /// defaults to the configured scan_timeout
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}
