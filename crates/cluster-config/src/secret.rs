//! The shared cluster secret.

use std::fmt;
use std::str::FromStr;

use rand::RngCore;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use thiserror::Error;

const SECRET_LEN: usize = 32;

/// 32-byte secret shared by every peer of a cluster.
///
/// Serialised as a lowercase hex string. `Debug` output is redacted so the
/// secret never reaches logs through `?config`.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterSecret([u8; SECRET_LEN]);

/// Errors raised while decoding a user-provided secret.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// The input was not valid hex.
    #[error("cluster secret is not a hex string: {0}")]
    NotHex(String),
    /// The decoded secret had the wrong length.
    #[error("cluster secret must be {expected} bytes, got {actual}")]
    Length {
        /// Required length in bytes.
        expected: usize,
        /// Decoded length in bytes.
        actual: usize,
    },
}

impl ClusterSecret {
    /// Generates a random secret from the operating system RNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; SECRET_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Decodes a hex-encoded secret, ignoring surrounding whitespace.
    pub fn decode(input: &str) -> Result<Self, SecretError> {
        let decoded =
            hex::decode(input.trim()).map_err(|error| SecretError::NotHex(error.to_string()))?;
        let bytes: [u8; SECRET_LEN] =
            decoded
                .as_slice()
                .try_into()
                .map_err(|_| SecretError::Length {
                    expected: SECRET_LEN,
                    actual: decoded.len(),
                })?;
        Ok(Self(bytes))
    }

    /// Raw secret bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ClusterSecret {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("ClusterSecret(<redacted>)")
    }
}

impl fmt::Display for ClusterSecret {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.0))
    }
}

impl FromStr for ClusterSecret {
    type Err = SecretError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::decode(input)
    }
}

impl Serialize for ClusterSecret {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for ClusterSecret {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(de::Error::custom)
    }
}
