//! Multiaddress strings used for listen and peer addresses.
//!
//! Only the textual shape is checked here: a leading `/`, followed by
//! `protocol/value` pairs whose first protocol names a network layer. Dialling
//! belongs to the network host.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

const NETWORK_PROTOCOLS: &[&str] = &["ip4", "ip6", "dns", "dns4", "dns6"];

/// Validated multiaddress such as `/ip4/10.0.0.1/tcp/9096/ipfs/<peer>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Multiaddr(String);

/// Errors raised while parsing a [`Multiaddr`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MultiaddrParseError {
    /// The address did not start with `/`.
    #[error("multiaddress '{0}' must start with '/'")]
    MissingLeadingSlash(String),
    /// A protocol was not followed by a value.
    #[error("multiaddress '{0}' has a protocol without a value")]
    Unpaired(String),
    /// The first protocol is not a network protocol.
    #[error("multiaddress '{address}' starts with unsupported protocol '{protocol}'")]
    UnsupportedProtocol {
        /// Offending address.
        address: String,
        /// First protocol segment.
        protocol: String,
    },
}

impl Multiaddr {
    /// Returns the address text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Value following the `ipfs`/`p2p` protocol, if present.
    #[must_use]
    pub fn peer_id(&self) -> Option<&str> {
        let segments: Vec<&str> = self.0.split('/').skip(1).collect();
        segments
            .chunks(2)
            .find(|pair| matches!(pair.first(), Some(&"ipfs" | &"p2p")))
            .and_then(|pair| pair.get(1).copied())
    }
}

impl FromStr for Multiaddr {
    type Err = MultiaddrParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(MultiaddrParseError::MissingLeadingSlash(trimmed.to_owned()));
        };
        let segments: Vec<&str> = rest.split('/').collect();
        if segments.len() % 2 != 0 || segments.iter().any(|segment| segment.is_empty()) {
            return Err(MultiaddrParseError::Unpaired(trimmed.to_owned()));
        }
        let protocol = segments.first().copied().unwrap_or_default();
        if !NETWORK_PROTOCOLS.contains(&protocol) {
            return Err(MultiaddrParseError::UnsupportedProtocol {
                address: trimmed.to_owned(),
                protocol: protocol.to_owned(),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl Serialize for Multiaddr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Multiaddr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(de::Error::custom)
    }
}
