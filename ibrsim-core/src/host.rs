use crate::{
    address::{Address, Endpoint, Port},
    application::Application,
    defaults::DEFAULT_FIRST_EPHEMERAL_PORT,
    message::Message,
    network::Network,
    socket::{Binding, Inbound},
    topology::Topology,
};
use std::{
    collections::{HashMap, hash_map::Entry},
    fmt, io,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
};
use thiserror::Error;
use tracing::info;

/// A virtual host: an address, its socket table and its applications.
///
/// Sockets are only bound while the host is being built (`&mut self`).
/// Once registered in a [`Network`] the socket table is read-only, which is
/// what lets any number of workers route through it without locking.
pub struct Host {
    address: Address,

    sockets: HashMap<Port, Inbound>,

    /// next ephemeral port to hand out, never goes back
    next_ephemeral: u32,

    /// taken out when the host starts
    applications: Mutex<Vec<Application>>,

    started: AtomicBool,
}

/// Why a message did not reach its destination socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// the sending address is not registered in the network
    UnknownSource,
    /// the destination address is not registered in the network
    UnknownDestination,
    /// the reachability policy forbids `source -> destination`
    Unreachable,
    /// nothing is bound on the destination port
    PortNotBound,
    /// the destination socket is no longer consumed
    Closed,
}

/// What happened to a routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// the message is in the destination socket's queue
    Delivered,
    /// the message was discarded, see [`Observer::dropped`]
    ///
    /// [`Observer::dropped`]: crate::observer::Observer::dropped
    Dropped(DropReason),
    /// the simulation is terminated, the message was not routed
    Cancelled,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("Port already in use: {endpoint}")]
    PortInUse { endpoint: Endpoint },
    #[error("No ephemeral port left on host {address}")]
    EphemeralPortsExhausted { address: Address },
}

#[derive(Debug, Error)]
pub enum StartError {
    #[error("Host {address} was already started")]
    AlreadyStarted { address: Address },
    #[error("The simulation was already started")]
    SimulationAlreadyStarted,
    #[error("Failed to spawn worker thread `{name}'")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl Host {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            sockets: HashMap::new(),
            next_ephemeral: u32::from(DEFAULT_FIRST_EPHEMERAL_PORT),
            applications: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Create the host and every application the topology places on it.
    ///
    /// Servers bind their well-known port, every other application binds
    /// an ephemeral port.
    pub fn from_topology<T>(address: Address, topology: &T) -> Result<Self, BindError>
    where
        T: Topology + ?Sized,
    {
        let mut host = Self::new(address);

        for name in topology.applications_on(address) {
            let application = Application::from_topology(&mut host, &name, topology)?;
            host.add_application(application);
        }

        Ok(host)
    }

    #[inline]
    pub fn address(&self) -> Address {
        self.address
    }

    /// the bound ports, in ascending order
    pub fn ports(&self) -> Vec<Port> {
        let mut ports: Vec<_> = self.sockets.keys().copied().collect();
        ports.sort_unstable();
        ports
    }

    pub fn is_bound(&self, port: Port) -> bool {
        self.sockets.contains_key(&port)
    }

    /// Returns a port that was never returned before on this host.
    ///
    /// Ports count up from [`DEFAULT_FIRST_EPHEMERAL_PORT`]. A port that was
    /// bound explicitly in that range is skipped.
    ///
    /// [`DEFAULT_FIRST_EPHEMERAL_PORT`]: crate::defaults::DEFAULT_FIRST_EPHEMERAL_PORT
    pub fn allocate_ephemeral_port(&mut self) -> Result<Port, BindError> {
        loop {
            let Ok(port) = Port::try_from(self.next_ephemeral) else {
                return Err(BindError::EphemeralPortsExhausted {
                    address: self.address,
                });
            };
            self.next_ephemeral += 1;

            if !self.is_bound(port) {
                return Ok(port);
            }
        }
    }

    /// bind a socket on `port`
    pub fn bind(&mut self, port: Port) -> Result<Binding, BindError> {
        let endpoint = self.address.with_port(port);

        match self.sockets.entry(port) {
            Entry::Occupied(_) => Err(BindError::PortInUse { endpoint }),
            Entry::Vacant(entry) => {
                let (binding, inbound) = Binding::new(endpoint);
                entry.insert(inbound);
                Ok(binding)
            }
        }
    }

    /// bind a socket on a fresh ephemeral port
    pub fn bind_ephemeral(&mut self) -> Result<Binding, BindError> {
        let port = self.allocate_ephemeral_port()?;
        self.bind(port)
    }

    pub fn add_application(&mut self, application: Application) {
        debug_assert_eq!(application.local().address(), self.address);

        self.applications
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .push(application);
    }

    /// Route a message sent by one of this host's sockets.
    ///
    /// This is the only place messages move between hosts. It never blocks
    /// and never fails: undeliverable messages are dropped and reported to
    /// the network's observer.
    pub fn route(&self, network: &Network, message: Message) -> Delivery {
        if network.is_terminated() {
            return Delivery::Cancelled;
        }
        network.record_routed();

        let destination = message.destination().address();

        let Some(host) = network.lookup(destination) else {
            return network.drop_message(message, DropReason::UnknownDestination);
        };

        if !network.reachability().reachable(self.address, destination) {
            return network.drop_message(message, DropReason::Unreachable);
        }

        match host.deliver(message) {
            Ok(()) => {
                network.record_delivered();
                Delivery::Delivered
            }
            Err((message, reason)) => network.drop_message(message, reason),
        }
    }

    /// push the message into the socket bound on its destination port
    fn deliver(&self, message: Message) -> Result<(), (Message, DropReason)> {
        let Some(inbound) = self.sockets.get(&message.destination().port()) else {
            return Err((message, DropReason::PortNotBound));
        };

        inbound
            .push(message)
            .map_err(|message| (message, DropReason::Closed))
    }

    /// Spawn the workers of every application of this host into `workers`.
    ///
    /// Can only be called once. On error the workers already spawned are
    /// left in `workers` for the caller to join.
    pub fn start(
        &self,
        network: &Arc<Network>,
        workers: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), StartError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyStarted {
                address: self.address,
            });
        }

        let applications = std::mem::take(
            &mut *self
                .applications
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        info!(host = %self.address, applications = applications.len(), "host is beginning simulation");

        for application in applications {
            application.start(network, workers)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("address", &self.address)
            .field("ports", &self.ports())
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSource => f.write_str("unknown source"),
            Self::UnknownDestination => f.write_str("unknown destination"),
            Self::Unreachable => f.write_str("unreachable destination"),
            Self::PortNotBound => f.write_str("port not bound"),
            Self::Closed => f.write_str("socket closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::MessageIdGenerator,
        network::NetworkBuilder,
        observer::{NoopObserver, Recorder},
        reachability::Partition,
        socket::SimSocket,
        topology::TopologyDescriptor,
    };

    const A: Address = Address::v4(10, 0, 0, 1);
    const B: Address = Address::v4(10, 0, 0, 2);
    const C: Address = Address::v4(10, 0, 0, 3);

    fn request(generator: &MessageIdGenerator, from: Endpoint, to: Endpoint) -> Message {
        Message::request(generator).from(from).to(to).build().unwrap()
    }

    #[test]
    fn bind_twice() {
        let mut host = Host::new(A);

        let _binding = host.bind(7000).unwrap();
        let error = host.bind(7000).unwrap_err();

        assert_eq!(
            error,
            BindError::PortInUse {
                endpoint: A.with_port(7000)
            }
        );
        assert_eq!(error.to_string(), "Port already in use: 10.0.0.1:7000");
    }

    #[test]
    fn ephemeral_ports_increase() {
        let mut host = Host::new(A);

        let first = host.allocate_ephemeral_port().unwrap();
        let second = host.allocate_ephemeral_port().unwrap();

        assert_eq!(first, DEFAULT_FIRST_EPHEMERAL_PORT);
        assert_eq!(second, first + 1);
    }

    #[test]
    fn ephemeral_ports_skip_bound_ports() {
        let mut host = Host::new(A);
        let _binding = host.bind(DEFAULT_FIRST_EPHEMERAL_PORT).unwrap();

        let binding = host.bind_ephemeral().unwrap();

        assert_eq!(binding.local_port(), DEFAULT_FIRST_EPHEMERAL_PORT + 1);
    }

    #[test]
    fn ephemeral_ports_run_out() {
        let mut host = Host::new(A);
        host.next_ephemeral = u32::from(Port::MAX);

        assert_eq!(host.allocate_ephemeral_port(), Ok(Port::MAX));
        assert_eq!(
            host.allocate_ephemeral_port(),
            Err(BindError::EphemeralPortsExhausted { address: A })
        );
    }

    #[test]
    fn from_topology_binds_servers_and_clients() {
        let mut topology = TopologyDescriptor::new();
        topology
            .add_host(A, ["echo", "pinger", "idle"])
            .server("echo", 7000)
            .traffic("pinger", 1.0, "echo");

        let host = Host::from_topology(A, &topology).unwrap();

        assert_eq!(
            host.ports(),
            vec![7000, DEFAULT_FIRST_EPHEMERAL_PORT, DEFAULT_FIRST_EPHEMERAL_PORT + 1]
        );
    }

    #[test]
    fn from_topology_rejects_two_servers_on_one_port() {
        let mut topology = TopologyDescriptor::new();
        topology
            .add_host(A, ["echo", "ping"])
            .server("echo", 7000)
            .server("ping", 7000);

        let error = Host::from_topology(A, &topology).unwrap_err();
        assert_eq!(
            error,
            BindError::PortInUse {
                endpoint: A.with_port(7000)
            }
        );
    }

    #[test]
    fn route_delivers_in_order() {
        let mut a = Host::new(A);
        let mut b = Host::new(B);
        let client = a.bind_ephemeral().unwrap();
        let server = b.bind(7000).unwrap();

        let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
        builder.register(a).unwrap();
        builder.register(b).unwrap();
        let network = builder.build();

        let first = request(network.ids(), client.local(), server.local());
        let second = request(network.ids(), client.local(), server.local());

        let host = network.lookup(A).unwrap();
        assert_eq!(host.route(&network, first.clone()), Delivery::Delivered);
        assert_eq!(host.route(&network, second.clone()), Delivery::Delivered);

        let mut socket = SimSocket::attach(server, Arc::clone(&network));
        assert_eq!(socket.try_recv(), Ok(first));
        assert_eq!(socket.try_recv(), Ok(second));
        assert_eq!(network.stats().delivered, 2);
    }

    #[test]
    fn route_to_unknown_address() {
        let mut a = Host::new(A);
        let client = a.bind_ephemeral().unwrap();
        let recorder = Arc::new(Recorder::new());

        let mut builder = NetworkBuilder::new().set_observer(recorder.clone());
        builder.register(a).unwrap();
        let network = builder.build();

        let message = request(network.ids(), client.local(), C.with_port(7000));
        let delivery = network.lookup(A).unwrap().route(&network, message.clone());

        assert_eq!(delivery, Delivery::Dropped(DropReason::UnknownDestination));
        assert_eq!(
            recorder.dropped(),
            vec![(message, DropReason::UnknownDestination)]
        );
        assert_eq!(network.stats().dropped, 1);
    }

    #[test]
    fn route_to_unbound_port() {
        let mut a = Host::new(A);
        let client = a.bind_ephemeral().unwrap();

        let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
        builder.register(a).unwrap();
        builder.register(Host::new(B)).unwrap();
        let network = builder.build();

        let message = request(network.ids(), client.local(), B.with_port(7000));

        assert_eq!(
            network.lookup(A).unwrap().route(&network, message),
            Delivery::Dropped(DropReason::PortNotBound)
        );
    }

    #[test]
    fn route_through_partition() {
        let mut a = Host::new(A);
        let mut b = Host::new(B);
        let client = a.bind_ephemeral().unwrap();
        let server = b.bind(7000).unwrap();

        let mut partition = Partition::new();
        partition.block(A, B);

        let mut builder = NetworkBuilder::new()
            .set_observer(Arc::new(NoopObserver))
            .set_reachability(partition);
        builder.register(a).unwrap();
        builder.register(b).unwrap();
        let network = builder.build();

        let message = request(network.ids(), client.local(), server.local());
        assert_eq!(
            network.lookup(A).unwrap().route(&network, message),
            Delivery::Dropped(DropReason::Unreachable)
        );

        // the partition is one way only
        let mut socket = SimSocket::attach(client, Arc::clone(&network));
        let reply = request(network.ids(), server.local(), socket.local());
        assert_eq!(
            network.lookup(B).unwrap().route(&network, reply.clone()),
            Delivery::Delivered
        );
        assert_eq!(socket.try_recv(), Ok(reply));
    }

    #[test]
    fn route_to_closed_socket() {
        let mut a = Host::new(A);
        let client = a.bind_ephemeral().unwrap();
        let server = a.bind(7000).unwrap();

        let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
        builder.register(a).unwrap();
        let network = builder.build();

        std::mem::drop(server);

        let message = request(network.ids(), client.local(), A.with_port(7000));
        assert_eq!(
            network.lookup(A).unwrap().route(&network, message),
            Delivery::Dropped(DropReason::Closed)
        );
    }

    #[test]
    fn start_adds_to_the_caller_workers() {
        let mut topology = TopologyDescriptor::new();
        topology.add_host(A, ["echo", "idle"]).server("echo", 7000);

        let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
        builder.register(Host::from_topology(A, &topology).unwrap()).unwrap();
        let network = builder.build();
        let host = network.lookup(A).unwrap();

        let mut workers = vec![std::thread::spawn(|| ())];
        host.start(&network, &mut workers).unwrap();
        // echo's server thread and idle's receiver thread
        assert_eq!(workers.len(), 3);

        assert!(matches!(
            host.start(&network, &mut workers),
            Err(StartError::AlreadyStarted { address: A })
        ));
        assert_eq!(workers.len(), 3);

        network.terminate();
        for worker in workers {
            worker.join().unwrap();
        }
    }

    #[test]
    fn route_after_termination() {
        let mut a = Host::new(A);
        let client = a.bind_ephemeral().unwrap();
        let server = a.bind(7000).unwrap();

        let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
        builder.register(a).unwrap();
        let network = builder.build();
        network.terminate();

        let message = request(network.ids(), client.local(), server.local());
        assert_eq!(
            network.lookup(A).unwrap().route(&network, message),
            Delivery::Cancelled
        );
        assert_eq!(network.stats().routed, 0);
    }

    #[test]
    fn concurrent_producers_lose_nothing() {
        let mut a = Host::new(A);
        let mut b = Host::new(B);
        let client = a.bind_ephemeral().unwrap();
        let server = b.bind(7000).unwrap();

        let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
        builder.register(a).unwrap();
        builder.register(b).unwrap();
        let network = builder.build();

        let (from, to) = (client.local(), server.local());
        let producers: Vec<_> = (0..4)
            .map(|_| {
                let network = Arc::clone(&network);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        let message = request(network.ids(), from, to);
                        assert_eq!(network.route(A, message), Delivery::Delivered);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let mut socket = SimSocket::attach(server, Arc::clone(&network));
        let mut ids = std::collections::HashSet::new();
        while let Ok(message) = socket.try_recv() {
            assert!(ids.insert(message.id()));
        }
        assert_eq!(ids.len(), 1_000);
    }
}
