//! Drive a [`Network`] from start to shutdown.

use anyhow::{Context, Result};
use ibrsim_core::{Network, SimStats};
use std::{sync::Arc, time::Duration};
use tracing::info;

/// When to end a run. Without any condition the run lasts until the
/// network is terminated from elsewhere.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopCondition {
    /// simulated time
    pub duration: Option<Duration>,
    /// messages routed by all the hosts together
    pub max_messages: Option<u64>,
}

impl StopCondition {
    pub fn is_met(&self, network: &Network) -> bool {
        let elapsed = self
            .duration
            .is_some_and(|duration| network.elapsed() >= duration);
        let routed = self
            .max_messages
            .is_some_and(|max| network.routed() >= max);

        elapsed || routed
    }
}

/// Start `network`, wait for `until` and shut everything down.
///
/// The condition is checked every wake interval of the network.
pub fn run(network: &Arc<Network>, until: StopCondition) -> Result<SimStats> {
    let simulation = network.start().context("Failed to start the simulation")?;
    info!(workers = simulation.workers(), "simulation is running");

    let poll = network.wake_interval();
    while !until.is_met(network) {
        if network.stop().sleep(poll).is_err() {
            break;
        }
    }

    simulation
        .shutdown()
        .context("Simulation failed to clean shutdown")?;

    let stats = network.stats();
    info!(
        elapsed = ?stats.elapsed,
        hosts = stats.hosts.len(),
        routed = stats.routed,
        delivered = stats.delivered,
        dropped = stats.dropped,
        "simulation summary"
    );

    Ok(stats)
}
