use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sweeper")]
#[command(
    author,
    version,
    about = "Throttled catch-up scheduler for media-library background work"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate configuration file
    Validate {
        /// Config file to validate (uses --config if not specified)
        config: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    ShowConfig,

    /// Run the scheduler against a synthetic library
    Simulate {
        /// Standalone items (movies) to generate
        #[arg(long, default_value = "20")]
        items: usize,

        /// Seasons to generate (3-10 episodes each)
        #[arg(long, default_value = "3")]
        seasons: usize,

        /// Libraries to spread items across
        #[arg(long, default_value = "2")]
        libraries: usize,

        /// Probability that a unit of work fails
        #[arg(long, default_value = "0.05")]
        fail_rate: f64,

        /// Probability that a unit of work reports a skip
        #[arg(long, default_value = "0.05")]
        skip_rate: f64,

        /// Override the throttle interval (seconds)
        #[arg(long, default_value = "1")]
        throttle_secs: u64,

        /// Give up after this many seconds
        #[arg(long, default_value = "300")]
        timeout_secs: u64,

        /// Output the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}
