use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str,
};
use thiserror::Error;

/// A socket port number on a virtual [`Host`].
///
/// [`Host`]: crate::host::Host
pub type Port = u16;

/// The identifier of a virtual host in the simulated network
///
/// Addresses are never reassigned: a host keeps the same address for the
/// whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(IpAddr);

/// An `(address, port)` pair, one end of a message exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint {
    address: Address,
    port: Port,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid host address `{input}'")]
pub struct AddressParseError {
    input: String,
}

impl Address {
    pub const LOCALHOST: Self = Self::v4(127, 0, 0, 1);

    pub const fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(IpAddr::V4(Ipv4Addr::new(a, b, c, d)))
    }

    pub const fn ip(self) -> IpAddr {
        self.0
    }

    pub const fn with_port(self, port: Port) -> Endpoint {
        Endpoint::new(self, port)
    }
}

impl Endpoint {
    pub const fn new(address: Address, port: Port) -> Self {
        Self { address, port }
    }

    #[inline]
    pub const fn address(&self) -> Address {
        self.address
    }

    #[inline]
    pub const fn port(&self) -> Port {
        self.port
    }
}

impl From<IpAddr> for Address {
    fn from(value: IpAddr) -> Self {
        Self(value)
    }
}

impl From<Ipv4Addr> for Address {
    fn from(value: Ipv4Addr) -> Self {
        Self(IpAddr::V4(value))
    }
}

impl From<Ipv6Addr> for Address {
    fn from(value: Ipv6Addr) -> Self {
        Self(IpAddr::V6(value))
    }
}

impl From<[u8; 4]> for Address {
    fn from(value: [u8; 4]) -> Self {
        Self::from(Ipv4Addr::from(value))
    }
}

impl str::FromStr for Address {
    type Err = AddressParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // `name/1.2.3.4` is accepted, only the part after the last `/' is
        // the address
        let ip = s.rsplit_once('/').map_or(s, |(_, ip)| ip).trim();

        ip.parse().map(Self).map_err(|_| AddressParseError {
            input: s.to_owned(),
        })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address.0 {
            IpAddr::V4(ip) => write!(f, "{ip}:{}", self.port),
            IpAddr::V6(ip) => write!(f, "[{ip}]:{}", self.port),
        }
    }
}
