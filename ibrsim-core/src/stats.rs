//! Simulation statistics and observability types.
//!
//! [`SimStats`] provides a point-in-time snapshot of the network state.
//! Obtain one via [`Network::stats`](crate::network::Network::stats).

use crate::address::{Address, Port};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

/// Snapshot of statistics for a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostStats {
    /// The host's address.
    pub address: Address,
    /// Ports bound on the host, in ascending order.
    pub ports: Vec<Port>,
}

/// Point-in-time snapshot of the entire simulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimStats {
    /// Simulated time since the run phase started.
    pub elapsed: Duration,
    /// Messages handed to a host for routing while the simulation was running.
    pub routed: u64,
    /// Messages that reached a socket queue.
    pub delivered: u64,
    /// Messages that were dropped, see [`DropReason`](crate::host::DropReason).
    pub dropped: u64,
    /// Per-host statistics, sorted by address.
    pub hosts: Vec<HostStats>,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    routed: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    pub(crate) fn routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// `(routed, delivered, dropped)`
    pub(crate) fn load(&self) -> (u64, u64, u64) {
        (
            self.routed.load(Ordering::Relaxed),
            self.delivered.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
        )
    }
}
