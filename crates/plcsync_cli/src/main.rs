//! PLCSync CLI
//!
//! Command-line tools for PLCSync device records and gateway runs.
//!
//! # Commands
//!
//! - `inspect` - Parse a device record and show its blocks and fields
//! - `encode` - Show the buffers a record writes to the device
//! - `classify` - Show how the gateway would route a remote event
//! - `simulate` - Run a gateway against an in-memory store and controller

mod commands;
mod error;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// PLCSync command-line tools.
#[derive(Parser)]
#[command(name = "plcsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a device record and show its blocks and fields
    Inspect {
        /// Path to the device record (JSON)
        record: PathBuf,

        /// Version to show (new, current); defaults to whichever exists
        #[arg(long = "version")]
        version: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the buffers a record writes to the device, as hex
    Encode {
        /// Path to the device record (JSON)
        record: PathBuf,

        /// Version to encode (new, current); defaults to whichever exists
        #[arg(long = "version")]
        version: Option<String>,
    },

    /// Show how the gateway would route a remote event
    Classify {
        /// Event type (put, patch)
        #[arg(short, long, default_value = "put")]
        event_type: String,

        /// Event path
        #[arg(short, long)]
        path: String,

        /// Event payload (JSON); omit for a deletion
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Run a gateway against an in-memory store and a simulated controller
    Simulate {
        /// Path to the device record (JSON)
        record: PathBuf,

        /// Device id to store the record under
        #[arg(long, default_value = "device-1")]
        device_id: String,

        /// Number of poll ticks to run
        #[arg(short, long, default_value = "3")]
        ticks: u64,

        /// Poll interval in milliseconds
        #[arg(long, default_value = "1000")]
        poll_interval_ms: u64,

        /// Provenance marker stamped on gateway writes
        #[arg(long, default_value = plcsync_engine::DEFAULT_MARKER)]
        marker: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect {
            record,
            version,
            format,
        } => {
            commands::inspect::run(&record, version.as_deref(), &format)?;
        }
        Commands::Encode { record, version } => {
            commands::encode::run(&record, version.as_deref())?;
        }
        Commands::Classify {
            event_type,
            path,
            data,
        } => {
            commands::classify::run(&event_type, &path, data.as_deref())?;
        }
        Commands::Simulate {
            record,
            device_id,
            ticks,
            poll_interval_ms,
            marker,
        } => {
            let options = commands::simulate::SimulateOptions {
                device_id,
                ticks,
                poll_interval_ms,
                marker,
            };
            commands::simulate::run(&record, &options)?;
        }
        Commands::Version => {
            println!("PLCSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("PLCSync Core v{}", plcsync_core::VERSION);
        }
    }

    Ok(())
}
