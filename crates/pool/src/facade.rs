//! Typed pool facades: one bounded pool bound to one resource spec.
//!
//! The generic pool only hands out values. The facade adds what it cannot
//! know: how to construct the resource, and that a recycled resource may be
//! inactive and has to be opened before use.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{Latency, PoolConfig};
use crate::error::{Error, Result};
use crate::guard::Lease;
use crate::kind::ResourceKind;
use crate::pool::{BoundedPool, PoolSnapshot, PoolStats};
use crate::resource::PooledResource;
use crate::resources::{EncryptionEngine, SecureConnection};

/// Pool of secure connections.
pub type ConnectionPool = Facade<SecureConnection>;

/// Pool of encryption engines.
pub type EnginePool = Facade<EncryptionEngine>;

// ---------------------------------------------------------------------------
// CheckoutError
// ---------------------------------------------------------------------------

/// Failure of a facade checkout.
///
/// When activation fails the resource has still been checked out: it is
/// handed back inside [`CheckoutError::Activation`], counted as in use, and
/// the caller decides whether to retry `open` or release it.
pub enum CheckoutError<T> {
    /// The pool could not hand out a resource.
    Pool(Error),
    /// A resource was checked out but could not be opened.
    Activation {
        /// The inactive resource, still in use.
        resource: T,
        /// Always [`Error::ResourceActivationFailed`].
        error: Error,
    },
}

impl<T> CheckoutError<T> {
    /// The underlying error.
    pub fn error(&self) -> &Error {
        match self {
            Self::Pool(error) | Self::Activation { error, .. } => error,
        }
    }

    /// Drop the resource (if any) and keep the error.
    pub fn into_error(self) -> Error {
        match self {
            Self::Pool(error) | Self::Activation { error, .. } => error,
        }
    }

    /// Take the inactive resource out of an activation failure.
    pub fn into_resource(self) -> Option<T> {
        match self {
            Self::Pool(_) => None,
            Self::Activation { resource, .. } => Some(resource),
        }
    }
}

impl<T> From<Error> for CheckoutError<T> {
    fn from(error: Error) -> Self {
        Self::Pool(error)
    }
}

impl<T> fmt::Debug for CheckoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pool(error) => f.debug_tuple("Pool").field(error).finish(),
            Self::Activation { error, .. } => f
                .debug_struct("Activation")
                .field("error", error)
                .finish_non_exhaustive(),
        }
    }
}

impl<T> fmt::Display for CheckoutError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.error(), f)
    }
}

impl<T> std::error::Error for CheckoutError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(self.error())
    }
}

/// Result of a facade checkout.
pub type Checkout<T> = std::result::Result<T, CheckoutError<T>>;

// ---------------------------------------------------------------------------
// CloseSummary
// ---------------------------------------------------------------------------

/// Outcome of [`Facade::close_all`].
#[derive(Debug, Default)]
pub struct CloseSummary {
    /// Resources taken out of the pool, active or not.
    pub drained: usize,
    /// Active resources whose `close()` succeeded.
    pub closed: usize,
    /// `close()` failures; the resources were discarded anyway.
    pub failures: Vec<Error>,
}

// ---------------------------------------------------------------------------
// Facade<R>
// ---------------------------------------------------------------------------

/// A bounded pool of one resource type built from one spec.
pub struct Facade<R: PooledResource> {
    key: ResourceKind,
    spec: R::Spec,
    pool: BoundedPool<R>,
    closed: AtomicBool,
}

impl<R: PooledResource> fmt::Debug for Facade<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facade")
            .field("key", &self.key)
            .field("snapshot", &self.pool.snapshot())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<R: PooledResource> Facade<R> {
    /// Create a facade whose pool builds resources from `spec`.
    ///
    /// # Errors
    /// Returns a configuration error if `spec` is unsupported or `config` is
    /// invalid.
    pub fn new(spec: R::Spec, config: PoolConfig, latency: Latency) -> Result<Self> {
        R::validate(&spec)?;
        let key = R::kind_of(&spec);
        let factory_spec = spec.clone();
        let pool = BoundedPool::new(key.to_string(), config, move || {
            R::create(factory_spec.clone(), latency)
        })?;
        tracing::debug!(pool = %key, capacity = pool.capacity(), "Created pool");
        Ok(Self {
            key,
            spec,
            pool,
            closed: AtomicBool::new(false),
        })
    }

    /// Registry key of this pool.
    pub fn key(&self) -> &ResourceKind {
        &self.key
    }

    /// Spec every resource of this pool is built from.
    pub fn spec(&self) -> &R::Spec {
        &self.spec
    }

    /// Maximum number of resources.
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Whether [`close_all`](Self::close_all) has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Check out an open resource, waiting as long as it takes.
    ///
    /// If the future is dropped while the resource is being opened, the
    /// resource goes back to the pool.
    pub async fn get(&self) -> Checkout<R> {
        self.ensure_open()?;
        let resource = self.pool.acquire().await?;
        self.activate(resource).await
    }

    /// Check out an open resource unless `token` is cancelled first.
    pub async fn get_cancellable(&self, token: &CancellationToken) -> Checkout<R> {
        self.ensure_open()?;
        let resource = self.pool.acquire_cancellable(token).await?;
        self.activate(resource).await
    }

    /// Check out an open resource, waiting at most `timeout`.
    ///
    /// `Ok(None)` means no resource became available in time.
    pub async fn get_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Option<R>, CheckoutError<R>> {
        self.ensure_open()?;
        match self.pool.acquire_timeout(timeout).await? {
            Some(resource) => self.activate(resource).await.map(Some),
            None => Ok(None),
        }
    }

    /// Check out an open resource wrapped in a [`Lease`].
    pub async fn lease(&self) -> Checkout<Lease<R>> {
        self.ensure_open()?;
        let lease = self.pool.lease().await?;
        self.activate_lease(lease).await
    }

    /// Timed variant of [`lease`](Self::lease).
    pub async fn lease_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Option<Lease<R>>, CheckoutError<Lease<R>>> {
        self.ensure_open()?;
        match self.pool.lease_timeout(timeout).await? {
            Some(lease) => self.activate_lease(lease).await.map(Some),
            None => Ok(None),
        }
    }

    /// Return a resource to the pool. It is not closed.
    pub fn release(&self, resource: R) -> Result<()> {
        self.pool.release(resource)
    }

    /// Shut the pool down.
    ///
    /// New checkouts fail with [`Error::PoolClosed`]. Every available
    /// resource is closed (when active) and discarded; resources still
    /// checked out are left to their holders and land back in the pool when
    /// released. Calling this again sweeps those late returns.
    pub async fn close_all(&self) -> CloseSummary {
        self.closed.store(true, Ordering::Release);
        let closed = AtomicUsize::new(0);
        let failures = Mutex::new(Vec::new());
        let drained = {
            let closed = &closed;
            let failures = &failures;
            let key = &self.key;
            self.pool
                .close_all(move |mut resource: R| async move {
                    if !resource.is_active() {
                        return;
                    }
                    match resource.close().await {
                        Ok(()) => {
                            closed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            tracing::warn!(
                                pool = %key,
                                resource_id = %resource.id(),
                                error = %e,
                                "Failed to close resource"
                            );
                            failures.lock().push(e);
                        }
                    }
                })
                .await
        };
        let closed = closed.into_inner();
        let failures = failures.into_inner();
        tracing::info!(pool = %self.key, drained, closed, failed = failures.len(), "Closed pool");
        CloseSummary {
            drained,
            closed,
            failures,
        }
    }

    /// Number of resources waiting in the pool.
    pub fn available_count(&self) -> usize {
        self.pool.available_count()
    }

    /// Number of resources checked out.
    pub fn in_use_count(&self) -> usize {
        self.pool.in_use_count()
    }

    /// Number of resources the pool holds.
    pub fn total_count(&self) -> usize {
        self.pool.total_count()
    }

    /// All counts, read atomically.
    pub fn snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    /// Cumulative statistics.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> Error {
        Error::PoolClosed {
            pool: self.key.to_string(),
        }
    }

    async fn activate(&self, resource: R) -> Checkout<R> {
        // The lease hands the resource back if this future is dropped
        // while `open()` is pending.
        let lease = Lease::new(resource, self.pool.clone());
        match self.activate_lease(lease).await {
            Ok(lease) => Ok(lease.detach()),
            Err(CheckoutError::Pool(error)) => Err(CheckoutError::Pool(error)),
            Err(CheckoutError::Activation { resource, error }) => Err(CheckoutError::Activation {
                resource: resource.detach(),
                error,
            }),
        }
    }

    async fn activate_lease(&self, mut lease: Lease<R>) -> Checkout<Lease<R>> {
        // A checkout admitted after `close_all` started gets nothing.
        if self.is_closed() {
            drop(lease);
            return Err(self.closed_error().into());
        }
        if !lease.is_active()
            && let Err(e) = lease.open().await
        {
            let error = self.activation_error(lease.id(), e);
            return Err(CheckoutError::Activation {
                resource: lease,
                error,
            });
        }
        Ok(lease)
    }

    fn activation_error(&self, resource_id: uuid::Uuid, source: Error) -> Error {
        tracing::warn!(
            pool = %self.key,
            %resource_id,
            error = %source,
            "Resource activation failed"
        );
        Error::ResourceActivationFailed {
            pool: self.key.to_string(),
            resource_id: resource_id.to_string(),
            source: Box::new(source),
        }
    }
}
