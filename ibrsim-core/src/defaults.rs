use crate::{address::Port, arrival::TimeScale};
use std::time::Duration;

/// First ephemeral port handed out by a [`Host`]
///
/// Client sockets that do not listen on a well-known port get the next
/// unused port counting up from this value.
///
/// ```
/// # use ibrsim_core::defaults::*;
/// assert_eq!(DEFAULT_FIRST_EPHEMERAL_PORT, 16_000);
/// ```
///
/// [`Host`]: crate::host::Host
pub const DEFAULT_FIRST_EPHEMERAL_PORT: Port = 16_000;

/// Default wake interval
///
/// This is the longest a worker blocked on an empty socket takes to notice
/// that the simulation was terminated.
///
/// See [`NetworkBuilder::set_wake_interval`] for more details
///
/// ```
/// # use ibrsim_core::defaults::*;
/// assert_eq!(DEFAULT_WAKE_INTERVAL.as_millis(), 10);
/// ```
///
/// [`NetworkBuilder::set_wake_interval`]: crate::network::NetworkBuilder::set_wake_interval
pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_millis(10);

/// Default [`TimeScale`]: one simulated second per wall-clock second.
pub const DEFAULT_TIME_SCALE: TimeScale = TimeScale::REAL_TIME;

/// Default seed of the shared random number generator
///
/// Runs using the same seed draw the same sequence of numbers. Since
/// many workers share the generator, the order in which they draw still
/// depends on thread scheduling.
pub const DEFAULT_SEED: u64 = 0;
