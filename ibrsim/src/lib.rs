/*!
# Topology driven simulations

Load a topology from a properties file (see [`properties`]) and run it
with [`ibrsim_core`] until a [`StopCondition`] is met.

```no_run
use ibrsim::{StopCondition, properties, run};
use ibrsim_core::NetworkBuilder;
use std::{sync::Arc, time::Duration};

let topology = properties::load("topologies/echo.properties")?;
let network = NetworkBuilder::from_topology(Arc::new(topology))?.build();

let stats = run(
    &network,
    StopCondition {
        duration: Some(Duration::from_secs(10)),
        max_messages: None,
    },
)?;
println!("{} messages routed", stats.routed);
# Ok::<(), anyhow::Error>(())
```
*/

pub mod host_pattern;
pub mod properties;
mod runner;

pub use self::{
    host_pattern::{HostPattern, HostPatternError},
    properties::{InvalidProperty, Properties, PropertiesError},
    runner::{StopCondition, run},
};
