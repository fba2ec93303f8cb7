/*!
Core of `ibrsim`: a simulated network of virtual hosts exchanging
request/response messages through sockets.

# Overview

A [`Network`] is a set of [`Host`]s, each with an [`Address`]. A host
binds sockets on [`Port`]s and runs applications. Applications come in
three flavours, all derived from a [`Topology`]:

* **servers** listen on a well-known port and answer every request with
  exactly one response;
* **clients** generate requests following a Poisson process of rate λ
  (see [`ArrivalRate`]) to a host picked at random among the ones
  running the destination application type;
* everything else only receives.

Messages move between hosts through [`Network::route`], filtered by a
[`Reachability`] policy. Nothing is printed: every event goes to the
[`Observer`] installed on the network, [`TracingObserver`] by default.

# Lifecycle

The network is assembled first, while nothing runs: hosts are created and
registered, their sockets bound. [`NetworkBuilder::build`] freezes it.
[`Network::start`] then spawns one thread per application duty, and
[`Simulation::shutdown`] terminates the run and waits for every thread.

```
use ibrsim_core::{Address, NetworkBuilder, Recorder, TopologyDescriptor};
use std::{sync::Arc, time::Duration};

let mut topology = TopologyDescriptor::new();
topology
    .add_host(Address::v4(10, 0, 0, 1), ["echo"])
    .add_host(Address::v4(10, 0, 0, 2), ["pinger"])
    .server("echo", 7000)
    .traffic("pinger", 100.0, "echo");

let recorder = Arc::new(Recorder::new());
let network = NetworkBuilder::from_topology(Arc::new(topology))?
    .set_observer(recorder.clone())
    .set_seed(42)
    .build();

let simulation = network.start()?;
std::thread::sleep(Duration::from_millis(200));
simulation.shutdown()?;

assert!(!recorder.sent().is_empty());
# Ok::<(), anyhow::Error>(())
```
*/

pub mod address;
pub mod application;
pub mod arrival;
pub mod defaults;
pub mod host;
pub mod message;
pub mod network;
pub mod observer;
pub mod reachability;
pub mod socket;
pub mod stats;
pub mod stop;
pub mod time;
pub mod topology;

pub use self::{
    address::{Address, AddressParseError, Endpoint, Port},
    application::{AppId, Application, ApplicationRole},
    arrival::{ArrivalRate, ArrivalRateError, TimeScale, TimeScaleError},
    host::{BindError, Delivery, DropReason, Host, StartError},
    message::{Kind, Message, MessageId, MessageIdGenerator, ProtocolError, Role},
    network::{BuildError, Network, NetworkBuilder, RegistryError, Simulation},
    observer::{NoopObserver, Observer, Recorder, TracingObserver},
    reachability::{FullMesh, Partition, Reachability, Tunnels},
    socket::{Binding, Receive, RecvError, SimSocket, Transmit, TryRecvError},
    stats::{HostStats, SimStats},
    stop::{Cancelled, Stop},
    topology::{NoDestinationAvailable, Topology, TopologyDescriptor},
};
