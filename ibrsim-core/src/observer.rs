//! Observation hooks.
//!
//! The simulation never prints. Every message sent, received or dropped is
//! reported to the [`Observer`] installed on the [`Network`]. The default
//! [`TracingObserver`] turns them into `tracing` events; [`Recorder`] keeps
//! them in memory for assertions.
//!
//! [`Network`]: crate::network::Network

use crate::{
    application::AppId, host::DropReason, message::Message, topology::NoDestinationAvailable,
};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// Receives the events of a running simulation.
///
/// Methods are called from the worker threads, concurrently, and should
/// return quickly. All of them default to doing nothing.
pub trait Observer: Send + Sync {
    /// `app` handed `message` to its host, which routed it
    ///
    /// Messages refused because the simulation terminated are not reported.
    fn sent(&self, app: &AppId, message: &Message) {
        let _ = (app, message);
    }

    /// `app` dequeued `message` from its socket
    fn received(&self, app: &AppId, message: &Message) {
        let _ = (app, message);
    }

    /// the network could not deliver `message`
    fn dropped(&self, message: &Message, reason: DropReason) {
        let _ = (message, reason);
    }

    /// a traffic generator has nowhere to send its requests, reported once
    /// before its client loop exits
    fn no_destination(&self, app: &AppId, error: &NoDestinationAvailable) {
        let _ = (app, error);
    }

    /// `app` received an attack-typed message
    ///
    /// Attack traffic gets no other treatment, this is the extension point.
    fn attack(&self, app: &AppId, message: &Message) {
        let _ = (app, message);
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Logs every event with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn sent(&self, app: &AppId, message: &Message) {
        debug!(%app, id = %message.id(), %message, ">>");
    }

    fn received(&self, app: &AppId, message: &Message) {
        debug!(%app, id = %message.id(), %message, "<<");
    }

    fn dropped(&self, message: &Message, reason: DropReason) {
        debug!(id = %message.id(), %message, %reason, "dropped");
    }

    fn no_destination(&self, app: &AppId, error: &NoDestinationAvailable) {
        warn!(%app, %error, "traffic generator stopped");
    }

    fn attack(&self, app: &AppId, message: &Message) {
        debug!(%app, id = %message.id(), %message, "attack traffic");
    }
}

/// An event captured by the [`Recorder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Sent { app: AppId, message: Message },
    Received { app: AppId, message: Message },
    Dropped { message: Message, reason: DropReason },
    NoDestination { app: AppId, error: NoDestinationAvailable },
    Attack { app: AppId, message: Message },
}

/// Keeps every event in memory, in the order they were reported.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// snapshot of all the events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn sent(&self) -> Vec<(AppId, Message)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Sent { app, message } => Some((app, message)),
                _ => None,
            })
            .collect()
    }

    pub fn received(&self) -> Vec<(AppId, Message)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Received { app, message } => Some((app, message)),
                _ => None,
            })
            .collect()
    }

    pub fn dropped(&self) -> Vec<(Message, DropReason)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Dropped { message, reason } => Some((message, reason)),
                _ => None,
            })
            .collect()
    }
}

impl Observer for Recorder {
    fn sent(&self, app: &AppId, message: &Message) {
        self.push(Event::Sent {
            app: app.clone(),
            message: message.clone(),
        });
    }

    fn received(&self, app: &AppId, message: &Message) {
        self.push(Event::Received {
            app: app.clone(),
            message: message.clone(),
        });
    }

    fn dropped(&self, message: &Message, reason: DropReason) {
        self.push(Event::Dropped {
            message: message.clone(),
            reason,
        });
    }

    fn no_destination(&self, app: &AppId, error: &NoDestinationAvailable) {
        self.push(Event::NoDestination {
            app: app.clone(),
            error: error.clone(),
        });
    }

    fn attack(&self, app: &AppId, message: &Message) {
        self.push(Event::Attack {
            app: app.clone(),
            message: message.clone(),
        });
    }
}
