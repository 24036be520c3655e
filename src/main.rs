mod cli;

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use sw_core::config::Config;
use sw_core::QueueKind;
use sweeper::simulate::{self, SimulateOptions, SimulationSummary};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "sweeper=debug,sw_scheduler=debug,sw_core=debug".to_string()
        } else {
            "sweeper=info,sw_scheduler=info,sw_core=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::ShowConfig => show_config(cli.config.as_deref()),
        Commands::Simulate {
            items,
            seasons,
            libraries,
            fail_rate,
            skip_rate,
            throttle_secs,
            timeout_secs,
            json,
        } => {
            let mut config = Config::load_or_default(cli.config.as_deref());
            config.scheduler.throttle_secs = throttle_secs;
            let opts = SimulateOptions {
                items,
                seasons,
                libraries,
                fail_rate,
                skip_rate,
                timeout: Duration::from_secs(timeout_secs),
                ..SimulateOptions::default()
            };
            let rt = tokio::runtime::Runtime::new()?;
            let summary = rt.block_on(simulate::run(config, opts));
            print_summary(&summary, json)
        }
        Commands::Version => {
            println!("sweeper {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)?;
            Config::from_json(&contents)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    let warnings = config.validate();
    println!("✓ Configuration is valid");
    println!("  Primary capacity: {}", config.scheduler.primary());
    println!("  Secondary capacity: {}", config.scheduler.secondary());
    println!("  Throttle: {}s", config.scheduler.throttle_secs);
    println!("  Catch-up: {}", config.scheduler.catchup);
    for kind in QueueKind::ALL {
        println!("  Stage {}: {}", kind, config.stages.is_enabled(kind));
    }
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}

fn show_config(path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(path);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_summary(summary: &SimulationSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!(
        "{:<16} {:>7} {:>9} {:>8} {:>7} {:>9} {:>7}",
        "queue", "queued", "completed", "skipped", "failed", "deferred", "cycles"
    );
    for kind in QueueKind::ALL {
        let t = summary.queues.get(&kind).cloned().unwrap_or_default();
        println!(
            "{:<16} {:>7} {:>9} {:>8} {:>7} {:>9} {:>7}",
            kind.as_str(),
            t.queued,
            t.completed,
            t.skipped,
            t.failed,
            t.deferred,
            t.cycles
        );
    }
    println!();
    println!("Handed off: {}", summary.handed_off);
    println!(
        "Seasons: {} aggregated, {} skipped",
        summary.seasons_aggregated, summary.seasons_skipped
    );
    if summary.lagged > 0 {
        println!("Missed events: {}", summary.lagged);
    }
    if !summary.settled {
        anyhow::bail!("queues did not settle before the timeout");
    }
    Ok(())
}
