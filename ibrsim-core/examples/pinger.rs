use ibrsim_core::{Address, NetworkBuilder, Recorder, TopologyDescriptor};
use std::{sync::Arc, time::Duration};

fn main() -> anyhow::Result<()> {
    let mut topology = TopologyDescriptor::new();
    topology
        .add_host(Address::v4(10, 0, 0, 1), ["echo"])
        .add_host(Address::v4(10, 0, 0, 2), ["pinger"])
        .add_host(Address::v4(10, 0, 0, 3), ["pinger"])
        .server("echo", 7000)
        .traffic("pinger", 5.0, "echo");

    let recorder = Arc::new(Recorder::new());
    let network = NetworkBuilder::from_topology(Arc::new(topology))?
        .set_observer(recorder.clone())
        .build();

    let simulation = network.start()?;
    std::thread::sleep(Duration::from_secs(2));
    simulation.shutdown()?;

    for (app, message) in recorder.received() {
        println!("{app} << {message}");
    }

    let stats = network.stats();
    println!(
        "{} routed, {} delivered, {} dropped in {:?}",
        stats.routed, stats.delivered, stats.dropped, stats.elapsed
    );

    Ok(())
}
