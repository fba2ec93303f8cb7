use crate::{
    address::{Endpoint, Port},
    host::Delivery,
    message::Message,
    network::Network,
};
use std::sync::{Arc, mpsc};
use thiserror::Error;

/// Sending side of a transport.
///
/// Implemented by the simulated sockets; a real network transport would
/// implement it too, the application workers only rely on this trait.
pub trait Transmit: Send {
    fn local(&self) -> Endpoint;

    fn local_port(&self) -> Port {
        self.local().port()
    }

    /// hand a message over for delivery
    ///
    /// never blocks and never fails: the returned [`Delivery`] says what
    /// happened to the message.
    fn send(&self, message: Message) -> Delivery;
}

/// Receiving side of a transport.
pub trait Receive: Send {
    fn local(&self) -> Endpoint;

    /// block until a message arrives or the simulation terminates
    fn recv(&mut self) -> Result<Message, RecvError>;
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    /// the simulation terminated while waiting, this is the normal exit
    #[error("Simulation terminated.")]
    Cancelled,
    #[error("Failed to receive message: disconnected.")]
    Disconnected,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    #[error("Simulation terminated.")]
    Cancelled,
    #[error("Failed to receive message: disconnected.")]
    Disconnected,
    #[error("No message to receive yet.")]
    Empty,
}

/// Producer side of a socket's inbound queue, kept in the host's socket
/// table. Any routing thread may push through it.
#[derive(Debug, Clone)]
pub(crate) struct Inbound(mpsc::Sender<Message>);

/// A port bound on a [`Host`] with its inbound queue.
///
/// This is the passive half of a socket: it exists from the moment the port
/// is bound, and messages routed to the port queue up in it. Attach it to
/// the running [`Network`] with [`SimSocket::attach`] to send and receive.
///
/// [`Host`]: crate::host::Host
#[derive(Debug)]
pub struct Binding {
    local: Endpoint,
    inbound: mpsc::Receiver<Message>,
}

/// A socket attached to a [`Network`].
pub struct SimSocket {
    reader: SimSocketReadHalf,
    writer: SimSocketWriteHalf,
}

/// The receiving half of a [`SimSocket`]. There is only one per socket,
/// it is the single consumer of the inbound queue.
pub struct SimSocketReadHalf {
    local: Endpoint,
    inbound: mpsc::Receiver<Message>,
    network: Arc<Network>,
}

/// The sending half of a [`SimSocket`]. Cheap to clone.
#[derive(Clone)]
pub struct SimSocketWriteHalf {
    local: Endpoint,
    network: Arc<Network>,
}

impl Inbound {
    pub(crate) fn push(&self, message: Message) -> Result<(), Message> {
        self.0.send(message).map_err(|error| error.0)
    }
}

impl Binding {
    pub(crate) fn new(local: Endpoint) -> (Self, Inbound) {
        let (sender, receiver) = mpsc::channel();
        (
            Self {
                local,
                inbound: receiver,
            },
            Inbound(sender),
        )
    }

    #[inline]
    pub fn local(&self) -> Endpoint {
        self.local
    }

    #[inline]
    pub fn local_port(&self) -> Port {
        self.local.port()
    }
}

impl SimSocket {
    pub fn attach(binding: Binding, network: Arc<Network>) -> Self {
        let Binding { local, inbound } = binding;
        Self {
            writer: SimSocketWriteHalf {
                local,
                network: Arc::clone(&network),
            },
            reader: SimSocketReadHalf {
                local,
                inbound,
                network,
            },
        }
    }

    #[inline]
    pub fn local(&self) -> Endpoint {
        self.reader.local
    }

    #[inline]
    pub fn local_port(&self) -> Port {
        self.reader.local.port()
    }

    pub fn send(&self, message: Message) -> Delivery {
        self.writer.send(message)
    }

    /// blocking call to receiving a message from the network
    pub fn recv(&mut self) -> Result<Message, RecvError> {
        self.reader.recv()
    }

    /// Non blocking call to receiving message on the socket
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        self.reader.try_recv()
    }

    pub fn into_split(self) -> (SimSocketReadHalf, SimSocketWriteHalf) {
        let Self { reader, writer } = self;

        (reader, writer)
    }
}

impl SimSocketReadHalf {
    #[inline]
    pub fn local(&self) -> Endpoint {
        self.local
    }

    /// blocking call to receiving a message from the network
    ///
    /// Once the simulation is terminated this returns
    /// [`RecvError::Cancelled`] within one wake interval (see
    /// [`NetworkBuilder::set_wake_interval`]), even if messages are still
    /// queued.
    ///
    /// [`NetworkBuilder::set_wake_interval`]: crate::network::NetworkBuilder::set_wake_interval
    pub fn recv(&mut self) -> Result<Message, RecvError> {
        let wake_interval = self.network.wake_interval();

        loop {
            if self.network.is_terminated() {
                return Err(RecvError::Cancelled);
            }

            match self.inbound.recv_timeout(wake_interval) {
                Ok(message) => return Ok(message),
                Err(mpsc::RecvTimeoutError::Timeout) => continue,
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(RecvError::Disconnected),
            }
        }
    }

    /// non blocking call to receiving message on the socket
    pub fn try_recv(&mut self) -> Result<Message, TryRecvError> {
        if self.network.is_terminated() {
            return Err(TryRecvError::Cancelled);
        }
        Ok(self.inbound.try_recv()?)
    }
}

impl SimSocketWriteHalf {
    #[inline]
    pub fn local(&self) -> Endpoint {
        self.local
    }

    #[inline]
    pub fn local_port(&self) -> Port {
        self.local.port()
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    /// route `message` from this socket's host
    pub fn send(&self, message: Message) -> Delivery {
        self.network.route(self.local.address(), message)
    }
}

impl Transmit for SimSocketWriteHalf {
    fn local(&self) -> Endpoint {
        self.local
    }

    fn send(&self, message: Message) -> Delivery {
        SimSocketWriteHalf::send(self, message)
    }
}

impl Transmit for SimSocket {
    fn local(&self) -> Endpoint {
        SimSocket::local(self)
    }

    fn send(&self, message: Message) -> Delivery {
        SimSocket::send(self, message)
    }
}

impl Receive for SimSocketReadHalf {
    fn local(&self) -> Endpoint {
        self.local
    }

    fn recv(&mut self) -> Result<Message, RecvError> {
        SimSocketReadHalf::recv(self)
    }
}

impl Receive for SimSocket {
    fn local(&self) -> Endpoint {
        SimSocket::local(self)
    }

    fn recv(&mut self) -> Result<Message, RecvError> {
        SimSocket::recv(self)
    }
}

impl From<mpsc::TryRecvError> for TryRecvError {
    fn from(value: mpsc::TryRecvError) -> Self {
        match value {
            mpsc::TryRecvError::Disconnected => Self::Disconnected,
            mpsc::TryRecvError::Empty => Self::Empty,
        }
    }
}
