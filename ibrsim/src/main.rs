use anyhow::{Context, Result};
use clap::Parser;
use ibrsim::{StopCondition, properties, run};
use ibrsim_core::{NetworkBuilder, TimeScale, defaults, time::SimDuration};
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Run a request/response traffic simulation
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the topology properties file
    topology: PathBuf,

    /// Stop after this much simulated time (e.g. `30s`, `1m 30s`)
    #[arg(long)]
    duration: Option<SimDuration>,

    /// Stop once this many messages were routed
    #[arg(long)]
    max_messages: Option<u64>,

    /// Seed of the random number generator
    #[arg(long, default_value_t = defaults::DEFAULT_SEED)]
    seed: u64,

    /// Wall-clock seconds per simulated second, `0.5` runs twice as fast
    #[arg(long, default_value_t = 1.0)]
    time_scale: f64,

    /// Longest time a blocked worker takes to notice the end of the run
    #[arg(long, default_value = "10ms")]
    wake_interval: SimDuration,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match simulate(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error:#}");
            ExitCode::FAILURE
        }
    }
}

fn simulate(cli: Cli) -> Result<()> {
    let topology = properties::load(&cli.topology)?;
    let time_scale = TimeScale::new(cli.time_scale).context("Invalid `--time-scale'")?;

    let network = NetworkBuilder::from_topology(Arc::new(topology))
        .with_context(|| format!("Failed to build the hosts of {}", cli.topology.display()))?
        .set_seed(cli.seed)
        .set_time_scale(time_scale)
        .set_wake_interval(cli.wake_interval.into_duration())
        .build();

    let until = StopCondition {
        duration: cli.duration.map(SimDuration::into_duration),
        max_messages: cli.max_messages,
    };

    run(&network, until)?;

    Ok(())
}
