//! Applications and their workers.
//!
//! An application is bound to one socket on one host. Depending on its
//! [`ApplicationRole`] it runs one or two worker threads:
//!
//! | role      | socket          | workers                    |
//! |-----------|-----------------|----------------------------|
//! | `Server`  | well-known port | server loop                |
//! | `Both`    | well-known port | server loop, client loop   |
//! | `Client`  | ephemeral port  | receiver loop, client loop |
//! | `Passive` | ephemeral port  | receiver loop              |
//!
//! Every loop exits on its own once the network is terminated.

use crate::{
    address::{Endpoint, Port},
    arrival::ArrivalRate,
    host::{BindError, Delivery, Host, StartError},
    message::{Kind, Message},
    network::Network,
    socket::{Binding, Receive, RecvError, SimSocket, Transmit},
    topology::Topology,
};
use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
};
use tracing::{debug, error};

/// Identifies an application instance: its type name and its socket.
///
/// Displayed as `type(address:port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId {
    name: Arc<str>,
    endpoint: Endpoint,
}

/// The duties of an application, derived from whether its type listens on
/// a well-known port and whether it generates traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationRole {
    Server,
    Client,
    Both,
    Passive,
}

#[derive(Debug)]
pub struct Application {
    id: AppId,
    role: ApplicationRole,
    arrival: Option<ArrivalRate>,
    binding: Binding,
}

impl AppId {
    pub fn new(name: impl Into<Arc<str>>, endpoint: Endpoint) -> Self {
        Self {
            name: name.into(),
            endpoint,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }
}

impl ApplicationRole {
    pub fn derive(server: bool, client: bool) -> Self {
        match (server, client) {
            (true, true) => Self::Both,
            (true, false) => Self::Server,
            (false, true) => Self::Client,
            (false, false) => Self::Passive,
        }
    }

    pub fn is_server(self) -> bool {
        matches!(self, Self::Server | Self::Both)
    }

    pub fn is_client(self) -> bool {
        matches!(self, Self::Client | Self::Both)
    }
}

impl Application {
    /// Create an application on `host`.
    ///
    /// With a `port` the application serves on it, otherwise it gets an
    /// ephemeral port. With an `arrival` rate it generates traffic.
    pub fn new(
        host: &mut Host,
        name: &str,
        port: Option<Port>,
        arrival: Option<ArrivalRate>,
    ) -> Result<Self, BindError> {
        let role = ApplicationRole::derive(port.is_some(), arrival.is_some());
        let binding = match port {
            Some(port) => host.bind(port)?,
            None => host.bind_ephemeral()?,
        };

        Ok(Self {
            id: AppId::new(name, binding.local()),
            role,
            arrival,
            binding,
        })
    }

    pub fn from_topology<T>(host: &mut Host, name: &str, topology: &T) -> Result<Self, BindError>
    where
        T: Topology + ?Sized,
    {
        Self::new(
            host,
            name,
            topology.well_known_port(name),
            topology.arrival_rate(name),
        )
    }

    pub fn id(&self) -> &AppId {
        &self.id
    }

    pub fn role(&self) -> ApplicationRole {
        self.role
    }

    pub fn arrival(&self) -> Option<ArrivalRate> {
        self.arrival
    }

    pub fn local(&self) -> Endpoint {
        self.binding.local()
    }

    /// attach the socket to the network and spawn the workers
    ///
    /// every handle spawned is pushed to `workers`, even when a later
    /// spawn fails, so the caller can still join them.
    pub(crate) fn start(
        self,
        network: &Arc<Network>,
        workers: &mut Vec<JoinHandle<()>>,
    ) -> Result<(), StartError> {
        let Self {
            id,
            role,
            arrival,
            binding,
        } = self;
        let (mut reader, writer) = SimSocket::attach(binding, Arc::clone(network)).into_split();

        debug!(app = %id, ?role, "starting application");

        if role.is_server() {
            let (name, network) = (format!("{id}/server"), Arc::clone(network));
            let (id, writer) = (id.clone(), writer.clone());
            workers.push(spawn(name, move || {
                server_loop(&id, &mut reader, &writer, &network)
            })?);
        } else {
            let (name, network) = (format!("{id}/receiver"), Arc::clone(network));
            let id = id.clone();
            workers.push(spawn(name, move || {
                receiver_loop(&id, &mut reader, &network)
            })?);
        }

        if let Some(rate) = arrival {
            let (name, network) = (format!("{id}/client"), Arc::clone(network));
            workers.push(spawn(name, move || {
                client_loop(&id, rate, &writer, &network)
            })?);
        }

        Ok(())
    }
}

fn spawn<F>(name: String, worker: F) -> Result<JoinHandle<()>, StartError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(worker)
        .map_err(|source| StartError::Spawn { name, source })
}

/// report a received message, and hand attack traffic to the attack hook
fn observe_received(id: &AppId, message: &Message, network: &Network) {
    network.observer().received(id, message);

    match message.kind() {
        Kind::Attack => network.observer().attack(id, message),
        Kind::Application => (),
    }
}

/// send `message`, it is reported as sent only if it was routed
fn transmit<T>(id: &AppId, message: Message, writer: &T, network: &Network) -> Delivery
where
    T: Transmit + ?Sized,
{
    let delivery = writer.send(message.clone());
    if delivery != Delivery::Cancelled {
        network.observer().sent(id, &message);
    }
    delivery
}

/// Answer every request received on `reader` with exactly one response.
///
/// Responses received here (a `Both` application receiving the answers to
/// its own requests) are observed and not answered.
pub fn server_loop<R, T>(id: &AppId, reader: &mut R, writer: &T, network: &Network)
where
    R: Receive + ?Sized,
    T: Transmit + ?Sized,
{
    loop {
        let message = match reader.recv() {
            Ok(message) => message,
            Err(RecvError::Cancelled) => break,
            Err(RecvError::Disconnected) => {
                debug!(app = %id, "socket disconnected");
                break;
            }
        };
        observe_received(id, &message, network);

        let Ok(response) = message.respond(network.ids()) else {
            continue;
        };

        if transmit(id, response, writer, network) == Delivery::Cancelled {
            break;
        }
    }

    debug!(app = %id, "server loop terminated");
}

/// Generate requests at the Poisson rate `rate` until the network terminates.
///
/// If the destination cannot be resolved the loop reports it once to the
/// observer and exits: the topology does not change during a run so there
/// is nothing to retry.
pub fn client_loop<T>(id: &AppId, rate: ArrivalRate, writer: &T, network: &Network)
where
    T: Transmit + ?Sized,
{
    while !network.is_terminated() {
        let destination = match network.resolve_destination(id.name()) {
            Ok(destination) => destination,
            Err(error) => {
                network.observer().no_destination(id, &error);
                break;
            }
        };

        let request = match Message::request(network.ids())
            .from(writer.local())
            .to(destination)
            .build()
        {
            Ok(request) => request,
            Err(error) => {
                error!(app = %id, %error, "failed to build request");
                break;
            }
        };

        if transmit(id, request, writer, network) == Delivery::Cancelled {
            break;
        }

        let interval = network.sample_interval(rate);
        if network.stop().sleep(interval).is_err() {
            break;
        }
    }

    debug!(app = %id, "client loop terminated");
}

/// Report every message received on `reader`, nothing else.
pub fn receiver_loop<R>(id: &AppId, reader: &mut R, network: &Network)
where
    R: Receive + ?Sized,
{
    loop {
        match reader.recv() {
            Ok(message) => observe_received(id, &message, network),
            Err(RecvError::Cancelled) => break,
            Err(RecvError::Disconnected) => {
                debug!(app = %id, "socket disconnected");
                break;
            }
        }
    }

    debug!(app = %id, "receiver loop terminated");
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.endpoint)
    }
}

impl fmt::Display for ApplicationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server => f.write_str("server"),
            Self::Client => f.write_str("client"),
            Self::Both => f.write_str("server+client"),
            Self::Passive => f.write_str("passive"),
        }
    }
}
