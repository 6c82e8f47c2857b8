//! MissionLink CLI
//!
//! Drives the engine against a simulated vehicle.
//!
//! # Commands
//!
//! - `simulate` - Upload, download and arm over a lossy simulated link
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// MissionLink command-line tools.
#[derive(Parser)]
#[command(name = "missionlink")]
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
    /// Run a mission round trip against the simulated vehicle
    Simulate {
        /// Number of mission items to upload
        #[arg(short, long, default_value = "10")]
        items: u16,

        /// Probability of losing any one frame (0.0 to 1.0)
        #[arg(short, long, default_value = "0.0")]
        loss: f64,

        /// Seed for the loss model
        #[arg(short, long, default_value = "0")]
        seed: u64,

        /// System id of the simulated vehicle
        #[arg(long, default_value = "1")]
        system_id: u8,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
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
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate {
            items,
            loss,
            seed,
            system_id,
            format,
        } => {
            commands::simulate::run(items, loss, seed, system_id, &format)?;
        }
        Commands::Version => {
            println!("MissionLink CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
