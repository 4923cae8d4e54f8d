//! Pool registry: one shared pool per resource kind.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::future::BoxFuture;
use parking_lot::RwLock;

use crate::config::RegistryConfig;
use crate::error::{Error, Result};
use crate::facade::{Checkout, CloseSummary, ConnectionPool, EnginePool, Facade};
use crate::kind::{ConnectionSpec, EngineSpec, ResourceKind};
use crate::pool::PoolSnapshot;
use crate::resource::PooledResource;
use crate::resources::{EncryptionEngine, SecureConnection};

/// Connection channels the registry pre-registers in
/// [`PoolRegistry::with_default_pools`].
const DEFAULT_CHANNELS: [&str; 3] = ["FILE", "DATABASE", "CLOUD"];

// ---------------------------------------------------------------------------
// Type-erased facade
// ---------------------------------------------------------------------------

/// Type-erased facade interface so the registry can keep pools of different
/// resource types in a single map.
trait AnyFacade: Send + Sync {
    fn key(&self) -> &ResourceKind;

    fn snapshot(&self) -> PoolSnapshot;

    fn close_all(&self) -> BoxFuture<'_, CloseSummary>;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<R: PooledResource> AnyFacade for Facade<R> {
    fn key(&self) -> &ResourceKind {
        Facade::key(self)
    }

    fn snapshot(&self) -> PoolSnapshot {
        Facade::snapshot(self)
    }

    fn close_all(&self) -> BoxFuture<'_, CloseSummary> {
        Box::pin(Facade::close_all(self))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn downcast<R: PooledResource>(facade: Arc<dyn AnyFacade>) -> Result<Arc<Facade<R>>> {
    let key = facade.key().clone();
    facade.into_any().downcast::<Facade<R>>().map_err(|_| {
        Error::configuration(format!(
            "pool '{key}' holds a different resource type than requested"
        ))
    })
}

// ---------------------------------------------------------------------------
// ShutdownReport
// ---------------------------------------------------------------------------

/// Outcome of [`PoolRegistry::close_all_pools`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Pools visited.
    pub pools: usize,
    /// Available resources closed across all pools.
    pub resources_closed: usize,
    /// Close failures, by pool. They never stop the remaining pools.
    pub failures: Vec<(ResourceKind, Error)>,
}

impl ShutdownReport {
    /// Whether every resource closed cleanly.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// PoolRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Active,
    Closed,
}

/// Directory of pools keyed by [`ResourceKind`].
///
/// Unrelated call sites asking for the same kind share one pool instead of
/// each building their own capacity. Pools are created on first request and
/// live until [`close_all_pools`](Self::close_all_pools), which is terminal.
/// Construct one registry per process and share it by `Arc`; tests build
/// as many independent registries as they like.
pub struct PoolRegistry {
    config: RegistryConfig,
    /// Pools indexed by resource kind.
    pools: DashMap<ResourceKind, Arc<dyn AnyFacade>>,
    /// Held for reading while a pool is created so shutdown cannot miss it.
    lifecycle: RwLock<Lifecycle>,
}

impl PoolRegistry {
    /// Create an empty registry.
    pub fn new(config: RegistryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pools: DashMap::new(),
            lifecycle: RwLock::new(Lifecycle::Active),
        })
    }

    /// Create a registry with the standard pools already registered:
    /// encrypted `FILE`, `DATABASE` and `CLOUD` connections and `AES_256`
    /// engines. No resource is constructed yet.
    pub fn with_default_pools(config: RegistryConfig) -> Result<Self> {
        let registry = Self::new(config)?;
        for channel in DEFAULT_CHANNELS {
            registry.connection_pool(channel, true, None)?;
        }
        registry.engine_pool("AES", 256, None)?;
        Ok(registry)
    }

    /// The registry configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Return the pool for `spec`, creating it on first request.
    ///
    /// `max_size` only applies when the pool is created; `None` uses the
    /// configured default for the kind. Concurrent first requests for one
    /// kind all get the same pool.
    ///
    /// # Errors
    /// [`Error::PoolClosed`] after shutdown, or a configuration error if the
    /// spec or size is invalid.
    pub fn get_or_create<R: PooledResource>(
        &self,
        spec: R::Spec,
        max_size: Option<usize>,
    ) -> Result<Arc<Facade<R>>> {
        let key = R::kind_of(&spec);
        let lifecycle = self.lifecycle.read();
        if *lifecycle == Lifecycle::Closed {
            return Err(Error::PoolClosed {
                pool: key.to_string(),
            });
        }

        // Clone the Arc to release the shard lock before downcasting.
        if let Some(existing) = self.pools.get(&key).map(|entry| Arc::clone(entry.value())) {
            return downcast(existing);
        }

        let facade = match self.pools.entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let config = self.config.pool_config_for(&key, max_size);
                let latency = self.config.latency_for(&key);
                let facade: Arc<dyn AnyFacade> = Arc::new(Facade::<R>::new(spec, config, latency)?);
                entry.insert(Arc::clone(&facade));
                tracing::info!(pool = %key, "Registered pool");
                facade
            }
        };
        drop(lifecycle);
        downcast(facade)
    }

    /// Pool of connections for `channel`.
    pub fn connection_pool(
        &self,
        channel: &str,
        encrypted: bool,
        max_size: Option<usize>,
    ) -> Result<Arc<ConnectionPool>> {
        self.get_or_create::<SecureConnection>(ConnectionSpec::new(channel, encrypted), max_size)
    }

    /// Pool of engines for `algorithm` and `key_size`.
    pub fn engine_pool(
        &self,
        algorithm: &str,
        key_size: u32,
        max_size: Option<usize>,
    ) -> Result<Arc<EnginePool>> {
        self.get_or_create::<EncryptionEngine>(EngineSpec::new(algorithm, key_size), max_size)
    }

    /// Check out a resource of the given spec, creating its pool if needed.
    pub async fn acquire<R: PooledResource>(&self, spec: R::Spec) -> Checkout<R> {
        let facade = self.get_or_create::<R>(spec, None)?;
        facade.get().await
    }

    /// Check out an open connection.
    pub async fn connection(&self, channel: &str, encrypted: bool) -> Checkout<SecureConnection> {
        self.acquire::<SecureConnection>(ConnectionSpec::new(channel, encrypted))
            .await
    }

    /// Check out an open encryption engine.
    pub async fn engine(&self, algorithm: &str, key_size: u32) -> Checkout<EncryptionEngine> {
        self.acquire::<EncryptionEngine>(EngineSpec::new(algorithm, key_size))
            .await
    }

    /// Return a resource to the pool matching its own kind.
    ///
    /// Still accepted after shutdown so holders can hand resources back.
    ///
    /// # Errors
    /// [`Error::InvalidRelease`] if no pool of that kind exists or the pool
    /// did not hand the resource out.
    pub fn release<R: PooledResource>(&self, resource: R) -> Result<()> {
        let key = resource.kind().clone();
        let facade = self
            .pools
            .get(&key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::InvalidRelease {
                pool: key.to_string(),
                resource_id: resource.id().to_string(),
            })?;
        let resource_id = resource.id();
        downcast::<R>(facade)
            .map_err(|_| Error::InvalidRelease {
                pool: key.to_string(),
                resource_id: resource_id.to_string(),
            })?
            .release(resource)
    }

    /// Return a connection to its pool.
    pub fn release_connection(&self, connection: SecureConnection) -> Result<()> {
        self.release(connection)
    }

    /// Return an engine to its pool.
    pub fn release_engine(&self, engine: EncryptionEngine) -> Result<()> {
        self.release(engine)
    }

    /// Shut down every pool.
    ///
    /// The registry stops creating and handing out pools. Each pool closes
    /// its available resources; a failure in one pool is logged and recorded
    /// in the report, and the remaining pools are still closed. Resources
    /// checked out during shutdown can still be released; calling this again
    /// closes them.
    pub async fn close_all_pools(&self) -> ShutdownReport {
        *self.lifecycle.write() = Lifecycle::Closed;

        let pools: Vec<Arc<dyn AnyFacade>> = self
            .pools
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut report = ShutdownReport::default();
        for facade in pools {
            let summary = facade.close_all().await;
            report.pools += 1;
            report.resources_closed += summary.closed;
            for error in summary.failures {
                tracing::error!(pool = %facade.key(), error = %error, "Pool shutdown failure");
                report.failures.push((facade.key().clone(), error));
            }
        }

        tracing::info!(
            pools = report.pools,
            resources_closed = report.resources_closed,
            failures = report.failures.len(),
            "Registry shut down"
        );
        report
    }

    /// Whether [`close_all_pools`](Self::close_all_pools) has run.
    pub fn is_closed(&self) -> bool {
        *self.lifecycle.read() == Lifecycle::Closed
    }

    /// Kinds with a registered pool, sorted by key.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self.pools.iter().map(|e| e.key().clone()).collect();
        kinds.sort_by_key(ToString::to_string);
        kinds
    }

    /// Counts of every pool, sorted by key.
    pub fn snapshots(&self) -> Vec<(ResourceKind, PoolSnapshot)> {
        let mut snapshots: Vec<_> = self
            .pools
            .iter()
            .map(|e| (e.key().clone(), e.value().snapshot()))
            .collect();
        snapshots.sort_by_key(|(kind, _)| kind.to_string());
        snapshots
    }

    /// Number of registered pools.
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    /// Whether no pool has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pool_count", &self.pools.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PoolRegistry {
        PoolRegistry::new(RegistryConfig::default()).unwrap()
    }

    #[test]
    fn starts_empty() {
        let registry = registry();
        assert!(registry.is_empty());
        assert!(!registry.is_closed());
    }

    #[test]
    fn default_pools_are_registered_lazily() {
        let registry = PoolRegistry::with_default_pools(RegistryConfig::default()).unwrap();
        let keys: Vec<String> = registry.kinds().iter().map(ToString::to_string).collect();
        assert_eq!(
            keys,
            ["AES_256", "CLOUD_ENCRYPTED", "DATABASE_ENCRYPTED", "FILE_ENCRYPTED"]
        );
        assert!(registry.snapshots().iter().all(|(_, s)| s.total() == 0));
    }

    #[test]
    fn same_kind_returns_same_pool() {
        let registry = registry();
        let a = registry.connection_pool("file", true, Some(2)).unwrap();
        let b = registry.connection_pool("FILE", true, Some(9)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.capacity(), 2, "first creation fixes the capacity");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn default_sizes_come_from_config() {
        let registry = registry();
        assert_eq!(registry.connection_pool("DATABASE", false, None).unwrap().capacity(), 5);
        assert_eq!(registry.engine_pool("AES", 128, None).unwrap().capacity(), 3);
    }

    #[test]
    fn invalid_spec_registers_nothing() {
        let registry = registry();
        assert!(registry.engine_pool("DES", 56, None).is_err());
        assert!(registry.connection_pool("FILE", true, Some(0)).is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn release_with_unknown_kind_is_invalid() {
        let other = registry();
        let conn = other.connection("CLOUD", true).await.unwrap();
        let registry = registry();

        let err = registry.release_connection(conn).unwrap_err();
        assert!(matches!(err, Error::InvalidRelease { ref pool, .. } if pool == "CLOUD_ENCRYPTED"));
    }

    #[tokio::test]
    async fn closed_registry_rejects_new_pools() {
        let registry = registry();
        registry.connection_pool("FILE", true, None).unwrap();
        let report = registry.close_all_pools().await;
        assert_eq!(report.pools, 1);
        assert!(report.is_clean());

        assert!(matches!(
            registry.connection_pool("CLOUD", true, None),
            Err(Error::PoolClosed { .. })
        ));
        let err = registry.connection("FILE", true).await.unwrap_err();
        assert!(matches!(err.error(), Error::PoolClosed { .. }));
    }
}
