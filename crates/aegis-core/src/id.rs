//! Strongly-typed identifiers for Aegis entities.
//!
//! Two identifier kinds exist:
//!
//! - [`DeploySuffix`]: the per-deployment random suffix embedded in cloud
//!   resource names. Generated once, persisted, and reused on every
//!   subsequent reconciliation run so resource names stay stable.
//! - [`RunId`]: a fresh identifier for each reconciliation run, used for
//!   log correlation and lock holder identification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// Number of random bytes in a deployment suffix.
pub const SUFFIX_LEN: usize = 4;

/// The random, stable per-deployment suffix.
///
/// Rendered as 8 lowercase hex characters and appended to resource names
/// (`cluster-protection-1a2b3c4d`). Regenerating the suffix is the only
/// event that changes a resource name, and therefore the only event that
/// forces a recreate instead of an in-place update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeploySuffix([u8; SUFFIX_LEN]);

impl DeploySuffix {
    /// Generates a new random suffix.
    ///
    /// Callers must persist the result; a suffix that is regenerated on
    /// every run would defeat name stability.
    #[must_use]
    pub fn generate() -> Self {
        Self(rand::random())
    }

    /// Creates a suffix from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; SUFFIX_LEN]) -> Self {
        Self(bytes)
    }

    /// Renders the suffix as lowercase hex.
    #[must_use]
    pub fn as_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for DeploySuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_hex())
    }
}

impl FromStr for DeploySuffix {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let decoded = hex::decode(s).map_err(|e| Error::InvalidId {
            message: format!("invalid deploy suffix '{s}': {e}"),
        })?;
        let bytes: [u8; SUFFIX_LEN] = decoded.try_into().map_err(|_| Error::InvalidId {
            message: format!("invalid deploy suffix '{s}': expected {SUFFIX_LEN} bytes"),
        })?;
        Ok(Self(bytes))
    }
}

impl TryFrom<String> for DeploySuffix {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<DeploySuffix> for String {
    fn from(suffix: DeploySuffix) -> Self {
        suffix.as_hex()
    }
}

/// A unique identifier for one reconciliation run.
///
/// ULIDs sort by creation time and need no coordination to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Ulid);

impl RunId {
    /// Generates a new unique run ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s).map(Self).map_err(|e| Error::InvalidId {
            message: format!("invalid run ID '{s}': {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_hex_roundtrip() {
        let suffix = DeploySuffix::from_bytes([0x1a, 0x2b, 0x3c, 0x4d]);
        assert_eq!(suffix.as_hex(), "1a2b3c4d");
        let parsed: DeploySuffix = "1a2b3c4d".parse().unwrap();
        assert_eq!(suffix, parsed);
    }

    #[test]
    fn suffix_rejects_wrong_length() {
        let result: Result<DeploySuffix> = "1a2b".parse();
        assert!(result.is_err());
    }

    #[test]
    fn suffix_rejects_non_hex() {
        let result: Result<DeploySuffix> = "zzzzzzzz".parse();
        assert!(result.is_err());
    }

    #[test]
    fn suffix_serde_uses_hex_string() {
        let suffix = DeploySuffix::from_bytes([0xde, 0xad, 0xbe, 0xef]);
        let json = serde_json::to_string(&suffix).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        let parsed: DeploySuffix = serde_json::from_str(&json).unwrap();
        assert_eq!(suffix, parsed);
    }

    #[test]
    fn generated_suffixes_differ() {
        // Collisions in 32 random bits are possible but vanishingly unlikely
        // across two draws.
        assert_ne!(DeploySuffix::generate(), DeploySuffix::generate());
    }

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::generate();
        let parsed: RunId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn invalid_run_id_returns_error() {
        let result: Result<RunId> = "not-a-valid-ulid".parse();
        assert!(result.is_err());
    }
}
