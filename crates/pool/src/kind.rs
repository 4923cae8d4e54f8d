//! Resource kinds: the keys pools are registered under.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a secure connection pool: backend channel plus encryption flag.
///
/// The channel is normalised to upper case so `"file"` and `"FILE"` share a
/// pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionSpec {
    /// Backend channel, e.g. `FILE`, `DATABASE`, `CLOUD`.
    pub channel: String,
    /// Whether traffic on the connection is encrypted.
    pub encrypted: bool,
}

impl ConnectionSpec {
    /// Create a connection spec for the given channel.
    pub fn new(channel: impl AsRef<str>, encrypted: bool) -> Self {
        Self {
            channel: channel.as_ref().trim().to_ascii_uppercase(),
            encrypted,
        }
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.encrypted {
            write!(f, "{}_ENCRYPTED", self.channel)
        } else {
            f.write_str(&self.channel)
        }
    }
}

/// Identity of an encryption engine pool: algorithm plus key size in bits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EngineSpec {
    /// Cipher family, e.g. `AES`.
    pub algorithm: String,
    /// Key size in bits.
    pub key_size: u32,
}

impl EngineSpec {
    /// Create an engine spec for the given algorithm and key size.
    pub fn new(algorithm: impl AsRef<str>, key_size: u32) -> Self {
        Self {
            algorithm: algorithm.as_ref().trim().to_ascii_uppercase(),
            key_size,
        }
    }
}

impl fmt::Display for EngineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.algorithm, self.key_size)
    }
}

/// The logical category of a pooled object.
///
/// Displays as the canonical registry key (`FILE_ENCRYPTED`, `AES_256`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ResourceKind {
    /// A pooled secure connection.
    Connection(ConnectionSpec),
    /// A pooled encryption engine.
    Engine(EngineSpec),
}

impl ResourceKind {
    /// Shorthand for a connection kind.
    pub fn connection(channel: impl AsRef<str>, encrypted: bool) -> Self {
        Self::Connection(ConnectionSpec::new(channel, encrypted))
    }

    /// Shorthand for an engine kind.
    pub fn engine(algorithm: impl AsRef<str>, key_size: u32) -> Self {
        Self::Engine(EngineSpec::new(algorithm, key_size))
    }

    /// Name of the resource family (`connection` or `engine`).
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Engine(_) => "engine",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(spec) => spec.fmt(f),
            Self::Engine(spec) => spec.fmt(f),
        }
    }
}

impl From<ConnectionSpec> for ResourceKind {
    fn from(spec: ConnectionSpec) -> Self {
        Self::Connection(spec)
    }
}

impl From<EngineSpec> for ResourceKind {
    fn from(spec: EngineSpec) -> Self {
        Self::Engine(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ResourceKind::connection("file", true), "FILE_ENCRYPTED")]
    #[case(ResourceKind::connection("Database", false), "DATABASE")]
    #[case(ResourceKind::connection(" cloud ", true), "CLOUD_ENCRYPTED")]
    #[case(ResourceKind::engine("aes", 256), "AES_256")]
    #[case(ResourceKind::engine("AES", 128), "AES_128")]
    fn kind_displays_registry_key(#[case] kind: ResourceKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn channel_case_does_not_split_keys() {
        assert_eq!(
            ResourceKind::connection("file", true),
            ResourceKind::connection("FILE", true)
        );
        assert_ne!(
            ResourceKind::connection("FILE", true),
            ResourceKind::connection("FILE", false)
        );
    }

    #[test]
    fn kind_serializes_with_family_tag() {
        let json = serde_json::to_value(ResourceKind::engine("AES", 256)).unwrap();
        assert_eq!(json["family"], "engine");
        assert_eq!(json["key_size"], 256);
    }
}
