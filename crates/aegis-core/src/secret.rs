//! Wrapper for secret-classified configuration values.
//!
//! Falcon API credentials pass through this tool on their way into the
//! function's environment. They must never appear in logs, `Debug` output,
//! or serialized state, so they are carried in a wrapper whose only path to
//! the cleartext is an explicit [`Redacted::expose`] call at the point the
//! value crosses into a remote API payload.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Marker emitted wherever a secret would otherwise be printed.
const REDACTED: &str = "[REDACTED]";

/// A string value that is redacted in all display and serialization paths.
#[derive(Clone, PartialEq, Eq)]
pub struct Redacted(String);

impl Redacted {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the cleartext value.
    ///
    /// Call this only at the boundary where the secret leaves the process
    /// (e.g. into a function environment payload), never in a log statement.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns whether the wrapped value is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Redacted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl std::fmt::Display for Redacted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(REDACTED)
    }
}

impl From<String> for Redacted {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Redacted {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// Deserializes from the cleartext (config files carry real credentials);
// serializes as the redaction marker so persisted state can never leak one.
impl<'de> Deserialize<'de> for Redacted {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

impl Serialize for Redacted {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}
