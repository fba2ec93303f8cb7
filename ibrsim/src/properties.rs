//! Topology files in the `key = value` properties format.
//!
//! ```text
//! # two echo servers and a pinger
//! hosts = 10.0.0.1-3, 10.0.1.1
//!
//! 10.0.0.1 = echo
//! 10.0.0.2 = echo
//! 10.0.1.1 = pinger
//!
//! echo.port = 7000
//! pinger.lambda = 5.0
//! pinger.dsttype = echo
//! ```
//!
//! * `hosts` (required) lists the host addresses, see [`HostPattern`];
//! * `<address>` lists the application types running on a host;
//! * `<type>.port` makes a type a server listening on that port;
//! * `<type>.lambda` is the rate of a traffic generator, a value `<= 0`
//!   means the type does not transmit;
//! * `<type>.dsttype` is the type the requests are sent to;
//! * `<type>.pAttack` is an attack rate, kept but not used.
//!
//! `:` can be used instead of `=`. Lines starting with `#` or `!` are
//! comments. A key given twice keeps its last value.
//!
//! [`HostPattern`]: crate::HostPattern

use crate::host_pattern::{self, HostPatternError};
use ibrsim_core::{Address, Port, TopologyDescriptor};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum PropertiesError {
    #[error("Failed to read topology file `{}'", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: missing `hosts' property", file.display())]
    MissingHosts { file: PathBuf },
    #[error("{}:{line}: {error}", file.display())]
    Invalid {
        file: PathBuf,
        line: usize,
        error: InvalidProperty,
    },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidProperty {
    #[error("expected `key = value', found `{0}'")]
    Syntax(String),
    #[error("invalid `hosts': {0}")]
    Hosts(#[from] HostPatternError),
    #[error("invalid port `{value}' for `{key}'")]
    Port { key: String, value: String },
    #[error("invalid number `{value}' for `{key}'")]
    Number { key: String, value: String },
    #[error("`{key}' has no value")]
    Empty { key: String },
}

/// A value and the line it was read from.
#[derive(Debug, Clone, PartialEq)]
struct Value {
    line: usize,
    text: String,
}

/// The raw `key = value` pairs of a file.
#[derive(Debug, Default)]
pub struct Properties {
    file: PathBuf,
    values: HashMap<String, Value>,
}

impl Properties {
    pub fn read(file: impl AsRef<Path>) -> Result<Self, PropertiesError> {
        let file = file.as_ref();
        let content = fs::read_to_string(file).map_err(|source| PropertiesError::Io {
            file: file.to_owned(),
            source,
        })?;

        Self::parse(file, &content)
    }

    /// parse `content`; `file` is only used in error messages
    pub fn parse(file: impl Into<PathBuf>, content: &str) -> Result<Self, PropertiesError> {
        let mut properties = Self {
            file: file.into(),
            values: HashMap::new(),
        };

        for (index, raw) in content.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }

            let Some(at) = trimmed.find(['=', ':']) else {
                return Err(properties.invalid(line, InvalidProperty::Syntax(trimmed.to_owned())));
            };
            let key = trimmed[..at].trim();
            if key.is_empty() {
                return Err(properties.invalid(line, InvalidProperty::Syntax(trimmed.to_owned())));
            }

            let text = trimmed[at + 1..].trim().to_owned();
            properties
                .values
                .insert(key.to_owned(), Value { line, text });
        }

        Ok(properties)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|value| value.text.as_str())
    }

    fn invalid(&self, line: usize, error: InvalidProperty) -> PropertiesError {
        PropertiesError::Invalid {
            file: self.file.clone(),
            line,
            error,
        }
    }

    /// parse the value of `key` with `parse`, `None` if the key is absent
    fn parse_value<T>(
        &self,
        key: &str,
        parse: impl FnOnce(&str) -> Result<T, InvalidProperty>,
    ) -> Result<Option<T>, PropertiesError> {
        let Some(value) = self.values.get(key) else {
            return Ok(None);
        };
        parse(&value.text)
            .map(Some)
            .map_err(|error| self.invalid(value.line, error))
    }

    fn list(&self, key: &str) -> Result<Option<Vec<String>>, PropertiesError> {
        self.parse_value(key, |text| {
            let items: Vec<_> = text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect();
            if items.is_empty() {
                Err(InvalidProperty::Empty {
                    key: key.to_owned(),
                })
            } else {
                Ok(items)
            }
        })
    }

    fn port(&self, key: &str) -> Result<Option<Port>, PropertiesError> {
        self.parse_value(key, |text| {
            text.parse().map_err(|_| InvalidProperty::Port {
                key: key.to_owned(),
                value: text.to_owned(),
            })
        })
    }

    fn number(&self, key: &str) -> Result<Option<f64>, PropertiesError> {
        self.parse_value(key, |text| match text.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(number),
            _ => Err(InvalidProperty::Number {
                key: key.to_owned(),
                value: text.to_owned(),
            }),
        })
    }

    fn word(&self, key: &str) -> Result<Option<String>, PropertiesError> {
        self.parse_value(key, |text| {
            if text.is_empty() {
                Err(InvalidProperty::Empty {
                    key: key.to_owned(),
                })
            } else {
                Ok(text.to_owned())
            }
        })
    }

    /// Build the topology these properties describe.
    pub fn topology(&self) -> Result<TopologyDescriptor, PropertiesError> {
        let hosts = self
            .parse_value("hosts", |text| Ok(host_pattern::expand(text)?))?
            .ok_or_else(|| PropertiesError::MissingHosts {
                file: self.file.clone(),
            })?;

        let mut topology = TopologyDescriptor::new();
        for address in &hosts {
            let applications = self.list(&address.to_string())?.unwrap_or_default();
            debug!(%address, ?applications, "host");
            topology.add_host(*address, applications);
        }

        for (key, value) in &self.values {
            if let Ok(address) = key.parse::<Address>()
                && !hosts.contains(&address)
            {
                warn!(
                    file = %self.file.display(),
                    line = value.line,
                    %address,
                    "address is not listed in `hosts', ignored"
                );
            }
        }

        // types run by a host, then the destination types they name
        let mut types: Vec<String> = topology.application_types().map(str::to_owned).collect();
        let mut next = 0;
        while let Some(app) = types.get(next).cloned() {
            next += 1;
            let port = self.port(&format!("{app}.port"))?;
            let lambda = self.number(&format!("{app}.lambda"))?;
            let destination = self.word(&format!("{app}.dsttype"))?;
            let attack_rate = self.number(&format!("{app}.pAttack"))?;

            let spec = topology.application_mut(app.as_str());
            spec.port = port;
            spec.lambda = lambda;
            spec.destination = destination.clone();
            spec.attack_rate = attack_rate;

            if lambda.is_some_and(|lambda| lambda > 0.0) && spec.destination.is_none() {
                warn!(%app, "traffic generator without `dsttype'");
            }

            if let Some(destination) = destination
                && !types.contains(&destination)
            {
                types.push(destination);
            }
        }

        Ok(topology)
    }
}

/// Read a topology file.
pub fn load(file: impl AsRef<Path>) -> Result<TopologyDescriptor, PropertiesError> {
    Properties::read(file)?.topology()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ibrsim_core::{ArrivalRate, NetworkBuilder, NoDestinationAvailable, Topology};
    use std::sync::Arc;

    const FILE: &str = "test.properties";

    const ECHO: &str = "\
# echo servers and pingers
hosts = 10.0.0.1-3, 10.0.1.1

10.0.0.1 = echo
10.0.0.2 : echo, pinger
10.0.1.1=pinger

! server side
echo.port = 7000
pinger.lambda = 5
pinger.dsttype = echo
pinger.pAttack = 0.25
";

    fn topology(content: &str) -> Result<TopologyDescriptor, PropertiesError> {
        Properties::parse(FILE, content)?.topology()
    }

    fn invalid(content: &str) -> (usize, InvalidProperty) {
        match topology(content) {
            Err(PropertiesError::Invalid { line, error, .. }) => (line, error),
            other => panic!("expected an invalid property, got {other:?}"),
        }
    }

    #[test]
    fn echo_topology() {
        let topology = topology(ECHO).unwrap();

        assert_eq!(
            topology.addresses(),
            vec![
                Address::v4(10, 0, 0, 1),
                Address::v4(10, 0, 0, 2),
                Address::v4(10, 0, 1, 1),
            ]
        );
        assert_eq!(
            topology.applications_on(Address::v4(10, 0, 0, 2)),
            vec!["echo", "pinger"]
        );
        assert_eq!(topology.well_known_port("echo"), Some(7000));
        assert_eq!(topology.well_known_port("pinger"), None);
        assert_eq!(
            topology.arrival_rate("pinger"),
            Some(ArrivalRate::new(5.0).unwrap())
        );
        assert_eq!(topology.destination_type("pinger").as_deref(), Some("echo"));
        assert_eq!(
            topology.application("pinger").and_then(|spec| spec.attack_rate),
            Some(0.25)
        );
        assert_eq!(
            topology.all_addresses_running("echo"),
            vec![Address::v4(10, 0, 0, 1), Address::v4(10, 0, 0, 2)]
        );
    }

    #[test]
    fn hosts_without_applications() {
        let topology = topology("hosts = 10.0.0.1-3").unwrap();

        assert_eq!(topology.len(), 2);
        assert!(topology.applications_on(Address::v4(10, 0, 0, 1)).is_empty());
    }

    #[test]
    fn unlisted_addresses_are_ignored() {
        let topology = topology("hosts = 10.0.0.1\n10.0.0.9 = echo").unwrap();

        assert_eq!(topology.addresses(), vec![Address::v4(10, 0, 0, 1)]);
        assert!(topology.all_addresses_running("echo").is_empty());
    }

    #[test]
    fn last_value_wins() {
        let topology = topology("hosts = 10.0.0.1\n10.0.0.1 = a\n10.0.0.1 = b").unwrap();

        assert_eq!(topology.applications_on(Address::v4(10, 0, 0, 1)), vec!["b"]);
    }

    #[test]
    fn non_positive_lambda_does_not_transmit() {
        let topology = topology("hosts = 10.0.0.1\n10.0.0.1 = idle\nidle.lambda = 0").unwrap();

        assert_eq!(topology.arrival_rate("idle"), None);
    }

    #[test]
    fn destination_types_keep_their_port() {
        let topology = topology(
            "hosts = 10.0.0.1\n10.0.0.1 = resolver\nresolver.lambda = 1\nresolver.dsttype = dns\ndns.port = 53",
        )
        .unwrap();

        assert_eq!(topology.well_known_port("dns"), Some(53));
        assert!(topology.all_addresses_running("dns").is_empty());

        let network = NetworkBuilder::new().set_topology(Arc::new(topology)).build();
        assert_eq!(
            network.resolve_destination("resolver"),
            Err(NoDestinationAvailable::NoHost {
                destination: "dns".to_owned()
            })
        );
    }

    #[test]
    fn missing_hosts() {
        assert!(matches!(
            topology("10.0.0.1 = echo"),
            Err(PropertiesError::MissingHosts { .. })
        ));
    }

    #[test]
    fn errors_carry_the_line() {
        assert_eq!(
            invalid("hosts = 10.0.0.1\n\njust some words"),
            (3, InvalidProperty::Syntax("just some words".to_owned()))
        );
        assert_eq!(
            invalid("hosts = 10.0.0.1\n10.0.0.1 = echo\necho.port = 70000"),
            (
                3,
                InvalidProperty::Port {
                    key: "echo.port".to_owned(),
                    value: "70000".to_owned()
                }
            )
        );
        assert_eq!(
            invalid("hosts = 10.0.0.1\n10.0.0.1 = echo\necho.lambda = fast"),
            (
                3,
                InvalidProperty::Number {
                    key: "echo.lambda".to_owned(),
                    value: "fast".to_owned()
                }
            )
        );
        assert!(matches!(
            invalid("# comment\nhosts = 10.0.0"),
            (2, InvalidProperty::Hosts(HostPatternError::Octets { found: 3, .. }))
        ));
    }

    #[test]
    fn error_message() {
        let error = topology("hosts = 10.0.0.1\n10.0.0.1 =").unwrap_err();

        assert_eq!(error.to_string(), "test.properties:2: `10.0.0.1' has no value");
    }
}
