//! The [`ServerAddress`] type used to identify a single server endpoint.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::error::{Error, ErrorKind, Result};

/// The default port a server listens on when none is given explicitly.
const DEFAULT_PORT: u16 = 27017;

/// The address of a single server in a cluster.
///
/// Two addresses are equal iff their hosts match case-insensitively and their ports match (a
/// missing port is treated as [`DEFAULT_PORT`]). The host is normalized to lowercase at
/// construction time so that `Display`, `Hash`, and `Eq` all agree with each other without
/// needing to re-normalize on every comparison.
#[derive(Clone, Debug, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ServerAddress {
    host: String,
    port: Option<u16>,
}

impl ServerAddress {
    /// Creates a new address from a host and an optional port.
    pub fn new(host: impl AsRef<str>, port: Option<u16>) -> Self {
        Self {
            host: host.as_ref().to_lowercase(),
            port,
        }
    }

    /// Parses a `host` or `host:port` string into an address.
    pub fn parse(address: impl AsRef<str>) -> Result<Self> {
        let address = address.as_ref();
        let mut parts = address.splitn(2, ':');

        let host = match parts.next() {
            Some(host) if !host.is_empty() => host,
            _ => {
                return Err(ErrorKind::InvalidArgument {
                    message: format!("invalid server address: \"{}\"; host cannot be empty", address),
                }
                .into())
            }
        };

        let port = match parts.next() {
            Some(port_str) => {
                let port: u16 = port_str.parse().map_err(|_| -> Error {
                    ErrorKind::InvalidArgument {
                        message: format!(
                            "port must be a valid 16-bit unsigned integer, instead got: \"{}\"",
                            port_str
                        ),
                    }
                    .into()
                })?;

                if port == 0 {
                    return Err(ErrorKind::InvalidArgument {
                        message: format!("invalid server address: \"{}\"; port must be non-zero", address),
                    }
                    .into());
                }

                Some(port)
            }
            None => None,
        };

        Ok(Self::new(host, port))
    }

    /// The normalized (lowercase) host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port, defaulting to [`DEFAULT_PORT`] if none was given.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

impl PartialEq for ServerAddress {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port() == other.port()
    }
}

impl Hash for ServerAddress {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port().hash(state);
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port())
    }
}

impl std::str::FromStr for ServerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
