use crate::{
    address::{Address, Endpoint},
    arrival::{ArrivalRate, TimeScale},
    defaults::{DEFAULT_SEED, DEFAULT_TIME_SCALE, DEFAULT_WAKE_INTERVAL},
    host::{BindError, Delivery, DropReason, Host, StartError},
    message::{Message, MessageIdGenerator},
    observer::{Observer, TracingObserver},
    reachability::{FullMesh, Reachability},
    stats::{Counters, HostStats, SimStats},
    stop::Stop,
    topology::{self, NoDestinationAvailable, Topology, TopologyDescriptor},
};
use anyhow::bail;
use rand_chacha::ChaChaRng;
use rand_core::SeedableRng as _;
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt,
    sync::{Arc, Mutex, OnceLock, PoisonError},
    thread::JoinHandle,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{info, warn};

/// The registry of every [`Host`] of the simulation and the services they
/// share: routing policy, observer, message ids, randomness and the stop
/// signal.
///
/// A network is assembled with a [`NetworkBuilder`] and is read-only once
/// built. Start it with [`Network::start`].
///
/// ```
/// use ibrsim_core::{Address, NetworkBuilder, TopologyDescriptor};
/// use std::{sync::Arc, time::Duration};
///
/// let mut topology = TopologyDescriptor::new();
/// topology
///     .add_host(Address::v4(10, 0, 0, 1), ["echo"])
///     .add_host(Address::v4(10, 0, 0, 2), ["pinger"])
///     .server("echo", 7000)
///     .traffic("pinger", 50.0, "echo");
///
/// let network = NetworkBuilder::from_topology(Arc::new(topology))
///     .unwrap()
///     .build();
/// let simulation = network.start().unwrap();
///
/// std::thread::sleep(Duration::from_millis(100));
/// simulation.shutdown().unwrap();
/// ```
pub struct Network {
    hosts: HashMap<Address, Host>,

    topology: Arc<dyn Topology>,
    reachability: Arc<dyn Reachability>,
    observer: Arc<dyn Observer>,

    ids: MessageIdGenerator,

    /// Centralised RNG for every random draw of the simulation: inter
    /// arrival times and destination hosts.
    rng: Mutex<ChaChaRng>,

    stop: Stop,
    started: OnceLock<Instant>,
    terminated: OnceLock<Instant>,

    time_scale: TimeScale,
    wake_interval: Duration,

    counters: Counters,
}

/// Assembles a [`Network`].
///
/// ## Defaults
///
/// | Setting       | Default                                 |
/// |---------------|-----------------------------------------|
/// | Topology      | empty [`TopologyDescriptor`]            |
/// | Reachability  | [`FullMesh`]                            |
/// | Observer      | [`TracingObserver`]                     |
/// | Seed          | [`DEFAULT_SEED`]                        |
/// | Time scale    | [`DEFAULT_TIME_SCALE`] (real time)      |
/// | Wake interval | [`DEFAULT_WAKE_INTERVAL`]               |
pub struct NetworkBuilder {
    hosts: HashMap<Address, Host>,
    topology: Arc<dyn Topology>,
    reachability: Arc<dyn Reachability>,
    observer: Arc<dyn Observer>,
    seed: u64,
    time_scale: TimeScale,
    wake_interval: Duration,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Host {address} is already registered")]
    DuplicateHost { address: Address },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A running simulation: the network and the worker threads of every
/// application.
///
/// Dropping it terminates the simulation without waiting for the workers,
/// call [`Simulation::shutdown`] to wait for them.
pub struct Simulation {
    network: Arc<Network>,
    workers: Vec<JoinHandle<()>>,
}

impl NetworkBuilder {
    pub fn new() -> Self {
        Self {
            hosts: HashMap::new(),
            topology: Arc::new(TopologyDescriptor::new()),
            reachability: Arc::new(FullMesh),
            observer: Arc::new(TracingObserver),
            seed: DEFAULT_SEED,
            time_scale: DEFAULT_TIME_SCALE,
            wake_interval: DEFAULT_WAKE_INTERVAL,
        }
    }

    /// Create a builder with one [`Host`] per address of `topology`, each
    /// running the applications the topology places on it.
    pub fn from_topology(topology: Arc<dyn Topology>) -> Result<Self, BuildError> {
        let mut builder = Self::new().set_topology(topology);
        builder.populate()?;
        Ok(builder)
    }

    /// The topology traffic generators resolve their destinations against.
    ///
    /// This does not create any host, see [`NetworkBuilder::populate`].
    pub fn set_topology(mut self, topology: Arc<dyn Topology>) -> Self {
        self.topology = topology;
        self
    }

    pub fn set_reachability<R>(mut self, reachability: R) -> Self
    where
        R: Reachability + 'static,
    {
        self.reachability = Arc::new(reachability);
        self
    }

    pub fn set_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Seed the network's random-number generator.
    ///
    /// The default seed is [`DEFAULT_SEED`].
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn set_time_scale(mut self, time_scale: TimeScale) -> Self {
        self.time_scale = time_scale;
        self
    }

    /// Longest time a worker blocked on an empty socket takes to notice
    /// the simulation was terminated.
    ///
    /// Shorter intervals make shutdown faster at the cost of more wake ups.
    pub fn set_wake_interval(mut self, wake_interval: Duration) -> Self {
        self.wake_interval = wake_interval;
        self
    }

    /// Register a host.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateHost`] if a host with the same address is
    /// already registered. The first registration is kept.
    pub fn register(&mut self, host: Host) -> Result<(), RegistryError> {
        match self.hosts.entry(host.address()) {
            Entry::Occupied(entry) => Err(RegistryError::DuplicateHost {
                address: *entry.key(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(host);
                Ok(())
            }
        }
    }

    /// Create and register a [`Host`] for every address of the topology.
    pub fn populate(&mut self) -> Result<(), BuildError> {
        let topology = Arc::clone(&self.topology);

        for address in topology.addresses() {
            let host = Host::from_topology(address, &*topology)?;
            self.register(host)?;
        }

        Ok(())
    }

    pub fn build(self) -> Arc<Network> {
        let Self {
            hosts,
            topology,
            reachability,
            observer,
            seed,
            time_scale,
            wake_interval,
        } = self;

        Arc::new(Network {
            hosts,
            topology,
            reachability,
            observer,
            ids: MessageIdGenerator::new(),
            rng: Mutex::new(ChaChaRng::seed_from_u64(seed)),
            stop: Stop::new(),
            started: OnceLock::new(),
            terminated: OnceLock::new(),
            time_scale,
            wake_interval,
            counters: Counters::default(),
        })
    }
}

impl Default for NetworkBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Network {
    pub fn lookup(&self, address: Address) -> Option<&Host> {
        self.hosts.get(&address)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Returns the shared [`MessageIdGenerator`] of this network.
    ///
    /// Every message of a run takes its id from it.
    pub fn ids(&self) -> &MessageIdGenerator {
        &self.ids
    }

    pub fn observer(&self) -> &dyn Observer {
        &*self.observer
    }

    pub fn reachability(&self) -> &dyn Reachability {
        &*self.reachability
    }

    pub fn topology(&self) -> &dyn Topology {
        &*self.topology
    }

    pub fn stop(&self) -> &Stop {
        &self.stop
    }

    #[inline]
    pub fn is_terminated(&self) -> bool {
        self.stop.get()
    }

    /// Terminate the simulation.
    ///
    /// Every worker returns within one wake interval. Returns `true` only
    /// for the call that actually terminated the simulation.
    pub fn terminate(&self) -> bool {
        let terminated = self.stop.toggle();
        if terminated {
            let _ = self.terminated.set(Instant::now());
            info!(elapsed = ?self.elapsed(), "simulation terminated");
        }
        terminated
    }

    /// Simulated time since the simulation started.
    ///
    /// Zero before [`Network::start`], frozen once terminated.
    pub fn elapsed(&self) -> Duration {
        let Some(started) = self.started.get() else {
            return Duration::ZERO;
        };
        let wall_clock = match self.terminated.get() {
            Some(terminated) => terminated.saturating_duration_since(*started),
            None => started.elapsed(),
        };
        self.time_scale.to_simulated(wall_clock)
    }

    pub fn wake_interval(&self) -> Duration {
        self.wake_interval
    }

    pub fn time_scale(&self) -> TimeScale {
        self.time_scale
    }

    /// draw the wall-clock time to wait before the next request of a
    /// generator with the given `rate`
    pub fn sample_interval(&self, rate: ArrivalRate) -> Duration {
        let simulated = rate.sample(&mut *self.rng());
        self.time_scale.to_wall_clock(simulated)
    }

    /// Pick the endpoint the next request of the application type `app`
    /// goes to.
    pub fn resolve_destination(&self, app: &str) -> Result<Endpoint, NoDestinationAvailable> {
        topology::resolve_destination(&*self.topology, app, &mut *self.rng())
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, ChaChaRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Route a message sent from `from`.
    ///
    /// See [`Host::route`].
    pub fn route(&self, from: Address, message: Message) -> Delivery {
        if self.is_terminated() {
            return Delivery::Cancelled;
        }

        match self.lookup(from) {
            Some(host) => host.route(self, message),
            None => {
                self.record_routed();
                self.drop_message(message, DropReason::UnknownSource)
            }
        }
    }

    pub(crate) fn record_routed(&self) {
        self.counters.routed();
    }

    pub(crate) fn record_delivered(&self) {
        self.counters.delivered();
    }

    pub(crate) fn drop_message(&self, message: Message, reason: DropReason) -> Delivery {
        self.counters.dropped();
        self.observer.dropped(&message, reason);
        Delivery::Dropped(reason)
    }

    /// messages routed so far, without taking a full [`SimStats`] snapshot
    pub fn routed(&self) -> u64 {
        self.counters.load().0
    }

    pub fn stats(&self) -> SimStats {
        let (routed, delivered, dropped) = self.counters.load();

        let mut hosts: Vec<_> = self
            .hosts
            .values()
            .map(|host| HostStats {
                address: host.address(),
                ports: host.ports(),
            })
            .collect();
        hosts.sort_unstable_by_key(|host| host.address);

        SimStats {
            elapsed: self.elapsed(),
            routed,
            delivered,
            dropped,
            hosts,
        }
    }

    /// Start every host, in ascending address order.
    ///
    /// # Errors
    ///
    /// If a worker cannot be spawned the simulation is terminated, the
    /// workers already started are joined and the error is returned.
    pub fn start(self: &Arc<Self>) -> Result<Simulation, StartError> {
        if self.started.set(Instant::now()).is_err() {
            return Err(StartError::SimulationAlreadyStarted);
        }

        let mut addresses: Vec<_> = self.hosts.keys().copied().collect();
        addresses.sort_unstable();

        info!(hosts = addresses.len(), "simulation is beginning");

        let mut simulation = Simulation {
            network: Arc::clone(self),
            workers: Vec::new(),
        };

        for address in addresses {
            let Some(host) = self.lookup(address) else {
                continue;
            };

            if let Err(error) = host.start(self, &mut simulation.workers) {
                if let Err(join) = simulation.shutdown() {
                    warn!(%join, "failed to stop the partially started simulation");
                }
                return Err(error);
            }
        }

        Ok(simulation)
    }
}

impl Simulation {
    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// number of worker threads
    pub fn workers(&self) -> usize {
        self.workers.len()
    }

    pub fn terminate(&self) -> bool {
        self.network.terminate()
    }

    /// Terminate the simulation and wait for every worker to return.
    pub fn shutdown(mut self) -> anyhow::Result<()> {
        self.network.terminate();

        let mut panicked = 0;
        for worker in std::mem::take(&mut self.workers) {
            if worker.join().is_err() {
                panicked += 1;
            }
        }

        if panicked > 0 {
            bail!("{panicked} worker thread(s) panicked")
        }

        Ok(())
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.network.terminate();
    }
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("hosts", &self.hosts.len())
            .field("reachability", &self.reachability)
            .field("terminated", &self.is_terminated())
            .field("time_scale", &self.time_scale)
            .field("wake_interval", &self.wake_interval)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("network", &self.network)
            .field("workers", &self.workers.len())
            .finish()
    }
}
