use crate::{
    address::{Address, Endpoint, Port},
    arrival::ArrivalRate,
};
use rand_core::Rng;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Read-only description of the simulated hosts and their applications.
///
/// The simulation consumes it once to create hosts and applications, then
/// again at run time when a traffic generator looks for a destination. It
/// must therefore not change during a run.
pub trait Topology: Send + Sync {
    /// every host address of the simulation
    fn addresses(&self) -> Vec<Address>;

    /// the application types running on `address`
    fn applications_on(&self, address: Address) -> Vec<String>;

    /// the port a server application type listens on, `None` for non servers
    fn well_known_port(&self, app: &str) -> Option<Port>;

    /// the traffic generation rate of an application type, `None` if it
    /// does not generate traffic
    fn arrival_rate(&self, app: &str) -> Option<ArrivalRate>;

    /// the application type the requests of `app` are sent to
    fn destination_type(&self, app: &str) -> Option<String>;

    /// every address running `app`, in ascending order
    fn all_addresses_running(&self, app: &str) -> Vec<Address>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoDestinationAvailable {
    #[error("`{app}' has no destination type")]
    NoDestinationType { app: String },
    #[error("destination type `{destination}' does not listen on any port")]
    NotAServer { destination: String },
    #[error("no host runs destination type `{destination}'")]
    NoHost { destination: String },
}

/// Pick the endpoint the next request of `app` goes to.
///
/// The host is drawn uniformly among all the hosts running the destination
/// type, the port is that type's well-known port.
pub fn resolve_destination<T, R>(
    topology: &T,
    app: &str,
    rng: &mut R,
) -> Result<Endpoint, NoDestinationAvailable>
where
    T: Topology + ?Sized,
    R: Rng,
{
    let Some(destination) = topology.destination_type(app) else {
        return Err(NoDestinationAvailable::NoDestinationType {
            app: app.to_owned(),
        });
    };
    let Some(port) = topology.well_known_port(&destination) else {
        return Err(NoDestinationAvailable::NotAServer { destination });
    };

    let candidates = topology.all_addresses_running(&destination);
    if candidates.is_empty() {
        return Err(NoDestinationAvailable::NoHost { destination });
    }

    let index = (rng.next_u64() % candidates.len() as u64) as usize;
    Ok(candidates[index].with_port(port))
}

/// Per application type parameters of a [`TopologyDescriptor`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationSpec {
    /// well-known listening port, makes the type a server
    pub port: Option<Port>,
    /// traffic rate λ, makes the type a client when strictly positive
    pub lambda: Option<f64>,
    /// application type the requests are sent to
    pub destination: Option<String>,
    /// kept for attack extensions, not used by the simulation
    pub attack_rate: Option<f64>,
}

/// In-memory [`Topology`].
///
/// ```
/// use ibrsim_core::{Address, Topology, TopologyDescriptor};
///
/// let mut topology = TopologyDescriptor::new();
/// topology
///     .add_host(Address::v4(10, 0, 0, 1), ["echo"])
///     .add_host(Address::v4(10, 0, 0, 2), ["pinger"])
///     .server("echo", 7000)
///     .traffic("pinger", 5.0, "echo");
///
/// assert_eq!(topology.well_known_port("echo"), Some(7000));
/// assert_eq!(
///     topology.all_addresses_running("echo"),
///     vec![Address::v4(10, 0, 0, 1)]
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopologyDescriptor {
    hosts: BTreeMap<Address, Vec<String>>,
    applications: HashMap<String, ApplicationSpec>,
}

impl TopologyDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// declare a host and the application types it runs
    ///
    /// declaring the same address again appends to its applications
    pub fn add_host<I, S>(&mut self, address: Address, applications: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let apps = self.hosts.entry(address).or_default();
        for app in applications {
            let app = app.into();
            self.applications.entry(app.clone()).or_default();
            apps.push(app);
        }
        self
    }

    pub fn application_mut(&mut self, app: impl Into<String>) -> &mut ApplicationSpec {
        self.applications.entry(app.into()).or_default()
    }

    pub fn application(&self, app: &str) -> Option<&ApplicationSpec> {
        self.applications.get(app)
    }

    /// every application type named by a host or configured explicitly
    pub fn application_types(&self) -> impl Iterator<Item = &str> {
        self.applications.keys().map(String::as_str)
    }

    pub fn server(&mut self, app: impl Into<String>, port: Port) -> &mut Self {
        self.application_mut(app).port = Some(port);
        self
    }

    pub fn traffic(
        &mut self,
        app: impl Into<String>,
        lambda: f64,
        destination: impl Into<String>,
    ) -> &mut Self {
        let spec = self.application_mut(app);
        spec.lambda = Some(lambda);
        spec.destination = Some(destination.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }
}

impl Topology for TopologyDescriptor {
    fn addresses(&self) -> Vec<Address> {
        self.hosts.keys().copied().collect()
    }

    fn applications_on(&self, address: Address) -> Vec<String> {
        self.hosts.get(&address).cloned().unwrap_or_default()
    }

    fn well_known_port(&self, app: &str) -> Option<Port> {
        self.applications.get(app)?.port
    }

    fn arrival_rate(&self, app: &str) -> Option<ArrivalRate> {
        let lambda = self.applications.get(app)?.lambda?;
        ArrivalRate::new(lambda).ok()
    }

    fn destination_type(&self, app: &str) -> Option<String> {
        self.applications.get(app)?.destination.clone()
    }

    fn all_addresses_running(&self, app: &str) -> Vec<Address> {
        self.hosts
            .iter()
            .filter(|(_, apps)| apps.iter().any(|a| a == app))
            .map(|(address, _)| *address)
            .collect()
    }
}
