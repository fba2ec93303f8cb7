use ibrsim_core::{Address, Host, Message, NetworkBuilder, NoopObserver, SimSocket};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    let mut server = Host::new(Address::v4(10, 0, 0, 1));
    let mut client = Host::new(Address::v4(10, 0, 0, 2));

    let listening = server.bind(7000)?;
    let ephemeral = client.bind_ephemeral()?;

    let mut builder = NetworkBuilder::new().set_observer(Arc::new(NoopObserver));
    builder.register(server)?;
    builder.register(client)?;
    let network = builder.build();

    let mut server = SimSocket::attach(listening, Arc::clone(&network));
    let mut client = SimSocket::attach(ephemeral, Arc::clone(&network));

    let request = Message::request(network.ids())
        .from(client.local())
        .to(server.local())
        .build()?;
    println!("{request}");
    client.send(request);

    let request = server.recv()?;
    let response = request.respond(network.ids())?;
    println!("{response}");
    server.send(response);

    let response = client.recv()?;
    assert_eq!(response.in_response_to(), Some(request.id()));

    network.terminate();
    Ok(())
}
