use crate::address::Endpoint;
use anyhow::{Result, bail};
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use thiserror::Error;

/// a generator for monotonicaly increasing **unique** [`MessageId`]
///
/// Clones share the same counter: one generator is owned by the
/// [`Network`] and every worker draws from it, so identifiers are unique
/// across all the hosts of a run, not only per host.
///
/// [`Network`]: crate::network::Network
#[derive(Debug, Clone)]
pub struct MessageIdGenerator(Arc<AtomicU64>);

/// # [`Message`] Identifier
///
/// Unique for the whole run. The first generated identifier is `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(u64);

/// Whether a message asks for something or answers something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Request,
    Response,
}

/// The traffic class of a message.
///
/// `Attack` is only a label: workers accept attack messages like any other
/// and hand them to [`Observer::attack`] without any other treatment.
///
/// [`Observer::attack`]: crate::observer::Observer::attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Kind {
    #[default]
    Application,
    Attack,
}

/// # A simulated message
///
/// Messages are immutable once built. A [`Role::Response`] always refers to
/// the request it answers and travels the exact reverse path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    id: MessageId,
    role: Role,
    kind: Kind,
    source: Endpoint,
    destination: Endpoint,
    in_response_to: Option<MessageId>,
}

pub struct RequestBuilder<'a> {
    generator: &'a MessageIdGenerator,
    kind: Kind,
    source: Option<Endpoint>,
    destination: Option<Endpoint>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Message {id} is a response, only requests can be answered")]
    NotARequest { id: MessageId },
}

impl MessageIdGenerator {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }

    /// generate a new unique identifier
    pub fn generate(&self) -> MessageId {
        let id = self.0.fetch_add(1, Ordering::SeqCst);

        debug_assert!(
            id != 0,
            "The only case this can be equal to 0 is if the generator overflowed. If this \
            happens it means we have generated `u64::MAX` unique message identifiers and we \
            wrapped around on overflow. This shouldn't happen!"
        );

        MessageId(id)
    }
}

impl Default for MessageIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageId {
    #[inline]
    pub const fn into_u64(self) -> u64 {
        self.0
    }
}

impl<'a> RequestBuilder<'a> {
    pub fn new(generator: &'a MessageIdGenerator) -> Self {
        Self {
            generator,
            kind: Kind::default(),
            source: None,
            destination: None,
        }
    }

    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn from(mut self, source: Endpoint) -> Self {
        self.source = Some(source);
        self
    }

    pub fn to(mut self, destination: Endpoint) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn build(self) -> Result<Message> {
        let Some(source) = self.source else {
            bail!("Missing sender information (`from')")
        };
        let Some(destination) = self.destination else {
            bail!("Missing recipient information (`to')")
        };

        Ok(Message {
            id: self.generator.generate(),
            role: Role::Request,
            kind: self.kind,
            source,
            destination,
            in_response_to: None,
        })
    }
}

impl Message {
    pub fn request(generator: &MessageIdGenerator) -> RequestBuilder<'_> {
        RequestBuilder::new(generator)
    }

    /// create the response to this request
    ///
    /// The response swaps the source and the destination and refers to
    /// this message's identifier. It keeps the request's [`Kind`].
    pub fn respond(&self, generator: &MessageIdGenerator) -> Result<Self, ProtocolError> {
        if self.role != Role::Request {
            return Err(ProtocolError::NotARequest { id: self.id });
        }

        Ok(Self {
            id: generator.generate(),
            role: Role::Response,
            kind: self.kind,
            source: self.destination,
            destination: self.source,
            in_response_to: Some(self.id),
        })
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn source(&self) -> Endpoint {
        self.source
    }

    pub fn destination(&self) -> Endpoint {
        self.destination
    }

    /// the request this message answers, always `None` for requests
    pub fn in_response_to(&self) -> Option<MessageId> {
        self.in_response_to
    }

    pub fn is_request(&self) -> bool {
        self.role == Role::Request
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("REQUEST"),
            Self::Response => f.write_str("RESPONSE"),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Application => f.write_str("APPLICATION"),
            Self::Attack => f.write_str("ATTACK"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{kind}.{role}({id}) {source} -> {destination}",
            kind = self.kind,
            role = self.role,
            id = self.id,
            source = self.source,
            destination = self.destination,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use std::{collections::HashSet, thread};

    const CLIENT: Endpoint = Address::v4(10, 0, 0, 2).with_port(16000);
    const SERVER: Endpoint = Address::v4(10, 0, 0, 1).with_port(7000);

    #[test]
    fn generator_starts_at_one() {
        let generator = MessageIdGenerator::new();

        assert_eq!(generator.generate().into_u64(), 1);
        assert_eq!(generator.generate().into_u64(), 2);
    }

    #[test]
    fn generator_clones_share_the_counter() {
        let generator = MessageIdGenerator::new();
        let clone = generator.clone();

        let a = generator.generate();
        let b = clone.generate();

        assert!(a < b);
    }

    #[test]
    fn unique_ids_across_threads() {
        let generator = MessageIdGenerator::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let generator = generator.clone();
                thread::spawn(move || (0..1_000).map(|_| generator.generate()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id), "{id} was generated twice");
            }
        }
        assert_eq!(seen.len(), 8_000);
    }

    #[test]
    fn builder_missing_from() {
        let Err(error) = Message::request(&MessageIdGenerator::new()).build() else {
            panic!("Expecting an error because missing the `from'")
        };

        assert_eq!(error.to_string(), "Missing sender information (`from')");
    }

    #[test]
    fn builder_missing_to() {
        let Err(error) = Message::request(&MessageIdGenerator::new())
            .from(CLIENT)
            .build()
        else {
            panic!("Expecting an error because missing the `to'")
        };

        assert_eq!(error.to_string(), "Missing recipient information (`to')");
    }

    #[test]
    fn request_never_answers_anything() {
        let request = Message::request(&MessageIdGenerator::new())
            .from(CLIENT)
            .to(SERVER)
            .build()
            .unwrap();

        assert_eq!(request.role(), Role::Request);
        assert_eq!(request.kind(), Kind::Application);
        assert_eq!(request.in_response_to(), None);
    }

    #[test]
    fn response_reverses_the_request() {
        let generator = MessageIdGenerator::new();
        let request = Message::request(&generator)
            .from(CLIENT)
            .to(SERVER)
            .kind(Kind::Attack)
            .build()
            .unwrap();

        let response = request.respond(&generator).unwrap();

        assert_eq!(response.role(), Role::Response);
        assert_eq!(response.in_response_to(), Some(request.id()));
        assert_eq!(response.source(), request.destination());
        assert_eq!(response.destination(), request.source());
        assert_eq!(response.kind(), Kind::Attack);
        assert_ne!(response.id(), request.id());
    }

    #[test]
    fn responses_cannot_be_answered() {
        let generator = MessageIdGenerator::new();
        let request = Message::request(&generator)
            .from(CLIENT)
            .to(SERVER)
            .build()
            .unwrap();
        let response = request.respond(&generator).unwrap();

        assert_eq!(
            response.respond(&generator),
            Err(ProtocolError::NotARequest { id: response.id() })
        );
    }

    #[test]
    fn display() {
        let request = Message::request(&MessageIdGenerator::new())
            .from(CLIENT)
            .to(SERVER)
            .build()
            .unwrap();

        assert_eq!(
            request.to_string(),
            "APPLICATION.REQUEST(1) 10.0.0.2:16000 -> 10.0.0.1:7000"
        );
    }
}
