//! Pool and registry configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kind::ResourceKind;

// ---------------------------------------------------------------------------
// PoolConfig
// ---------------------------------------------------------------------------

/// Order in which released resources are handed out again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReuseOrder {
    /// Oldest released resource first.
    #[default]
    Fifo,
    /// Most recently released resource first.
    Lifo,
}

/// Configuration for a single bounded pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of resources in the pool (available + in use)
    pub max_size: usize,
    /// Reuse order of available resources
    pub reuse: ReuseOrder,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 5,
            reuse: ReuseOrder::Fifo,
        }
    }
}

impl PoolConfig {
    /// Pool config with the given capacity and default reuse order.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            max_size,
            ..Self::default()
        }
    }

    /// Validate pool configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        // tokio's semaphore caps the permit count.
        if self.max_size > tokio::sync::Semaphore::MAX_PERMITS {
            return Err(Error::configuration(format!(
                "max_size ({}) exceeds the admission limit ({})",
                self.max_size,
                tokio::sync::Semaphore::MAX_PERMITS
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Latency
// ---------------------------------------------------------------------------

/// Simulated cost of resource operations.
///
/// Real backends pay for handshakes and key schedules; the simulated
/// resources sleep for these durations instead. Everything is zero by
/// default so tests run fast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Latency {
    /// Time to construct a new resource, in milliseconds.
    pub construct_ms: u64,
    /// Time to open an inactive resource, in milliseconds.
    pub open_ms: u64,
    /// Time to close an active resource, in milliseconds.
    pub close_ms: u64,
    /// Time per data operation (send, receive, encrypt, ...), in milliseconds.
    pub transfer_ms: u64,
}

impl Latency {
    /// No simulated latency.
    pub const NONE: Self = Self {
        construct_ms: 0,
        open_ms: 0,
        close_ms: 0,
        transfer_ms: 0,
    };

    /// Costs of a secure connection handshake.
    #[must_use]
    pub const fn connection() -> Self {
        Self {
            construct_ms: 500,
            open_ms: 100,
            close_ms: 50,
            transfer_ms: 30,
        }
    }

    /// Costs of an encryption engine warm-up.
    #[must_use]
    pub const fn engine() -> Self {
        Self {
            construct_ms: 800,
            open_ms: 0,
            close_ms: 0,
            transfer_ms: 50,
        }
    }

    /// Construction delay.
    #[must_use]
    pub fn construct(&self) -> Duration {
        Duration::from_millis(self.construct_ms)
    }

    /// Open delay.
    #[must_use]
    pub fn open(&self) -> Duration {
        Duration::from_millis(self.open_ms)
    }

    /// Close delay.
    #[must_use]
    pub fn close(&self) -> Duration {
        Duration::from_millis(self.close_ms)
    }

    /// Data operation delay.
    #[must_use]
    pub fn transfer(&self) -> Duration {
        Duration::from_millis(self.transfer_ms)
    }
}

/// Sleep for `delay`, skipping the timer entirely when it is zero.
pub(crate) async fn simulate(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

// ---------------------------------------------------------------------------
// RegistryConfig
// ---------------------------------------------------------------------------

/// Configuration for a [`PoolRegistry`](crate::PoolRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capacity of connection pools created without an explicit size
    pub default_connections: usize,
    /// Capacity of engine pools created without an explicit size
    pub default_engines: usize,
    /// Per-kind capacity overrides keyed by the canonical kind string
    /// (`FILE_ENCRYPTED`, `AES_256`)
    pub overrides: HashMap<String, usize>,
    /// Reuse order for every pool the registry creates
    pub reuse: ReuseOrder,
    /// Simulated connection costs
    pub connection_latency: Latency,
    /// Simulated engine costs
    pub engine_latency: Latency,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_connections: 5,
            default_engines: 3,
            overrides: HashMap::new(),
            reuse: ReuseOrder::Fifo,
            connection_latency: Latency::NONE,
            engine_latency: Latency::NONE,
        }
    }
}

impl RegistryConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("invalid registry config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Create configuration from environment variables
    ///
    /// Reads `KEYWARD_POOL_CONNECTIONS`, `KEYWARD_POOL_ENGINES`,
    /// `KEYWARD_POOL_REUSE` (`fifo` / `lifo`) and
    /// `KEYWARD_POOL_SIMULATE_LATENCY` (`1` / `true`).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("KEYWARD_POOL_CONNECTIONS") {
            config.default_connections = parse_size("KEYWARD_POOL_CONNECTIONS", &raw)?;
        }
        if let Some(raw) = lookup("KEYWARD_POOL_ENGINES") {
            config.default_engines = parse_size("KEYWARD_POOL_ENGINES", &raw)?;
        }
        if let Some(raw) = lookup("KEYWARD_POOL_REUSE") {
            config.reuse = match raw.to_lowercase().as_str() {
                "fifo" => ReuseOrder::Fifo,
                "lifo" => ReuseOrder::Lifo,
                other => {
                    return Err(Error::configuration(format!(
                        "KEYWARD_POOL_REUSE must be fifo or lifo, got '{other}'"
                    )));
                }
            };
        }
        if let Some(raw) = lookup("KEYWARD_POOL_SIMULATE_LATENCY")
            && matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes")
        {
            config.connection_latency = Latency::connection();
            config.engine_latency = Latency::engine();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate registry configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.default_connections == 0 {
            return Err(Error::configuration(
                "default_connections must be greater than 0",
            ));
        }
        if self.default_engines == 0 {
            return Err(Error::configuration("default_engines must be greater than 0"));
        }
        if let Some((key, _)) = self.overrides.iter().find(|(_, size)| **size == 0) {
            return Err(Error::configuration(format!(
                "override for '{key}' must be greater than 0"
            )));
        }
        Ok(())
    }

    /// Capacity a pool for `kind` gets when the caller does not pick one.
    #[must_use]
    pub fn max_size_for(&self, kind: &ResourceKind) -> usize {
        if let Some(size) = self.overrides.get(&kind.to_string()) {
            return *size;
        }
        match kind {
            ResourceKind::Connection(_) => self.default_connections,
            ResourceKind::Engine(_) => self.default_engines,
        }
    }

    /// Pool config for `kind`, honouring an explicit size when given.
    #[must_use]
    pub fn pool_config_for(&self, kind: &ResourceKind, max_size: Option<usize>) -> PoolConfig {
        PoolConfig {
            max_size: max_size.unwrap_or_else(|| self.max_size_for(kind)),
            reuse: self.reuse,
        }
    }

    /// Simulated latency for resources of `kind`.
    #[must_use]
    pub fn latency_for(&self, kind: &ResourceKind) -> Latency {
        match kind {
            ResourceKind::Connection(_) => self.connection_latency,
            ResourceKind::Engine(_) => self.engine_latency,
        }
    }
}

fn parse_size(var: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse()
        .map_err(|e| Error::configuration(format!("{var}: '{raw}' is not a pool size ({e})")))
}
