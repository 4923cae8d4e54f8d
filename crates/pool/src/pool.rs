//! Bounded pool: fair admission plus lazy construction and reuse.
//!
//! `BoundedPool<T>` gates concurrency with a fair semaphore holding one
//! permit per slot. A permit is taken *before* the bookkeeping lock, so
//! waiters park without holding the lock, and the factory runs outside the
//! lock: a slow constructor never blocks releases or count queries.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::config::{PoolConfig, ReuseOrder};
use crate::error::{Error, Result};
use crate::guard::Lease;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity of a pooled value.
///
/// The pool remembers checked-out values by this key to reject double
/// releases and values it never handed out. Two live values must never
/// share an id, including values from different pools: a pool cannot tell
/// a foreign value apart from its own if their ids collide.
pub trait Identify {
    /// The identity type.
    type Id: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static;

    /// Identity of this value.
    fn id(&self) -> Self::Id;
}

// ---------------------------------------------------------------------------
// Snapshots and statistics
// ---------------------------------------------------------------------------

/// Instantaneous counts, all read under one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Resources waiting in the pool.
    pub available: usize,
    /// Resources checked out by callers.
    pub in_use: usize,
    /// Configured capacity.
    pub capacity: usize,
}

impl PoolSnapshot {
    /// Resources the pool currently holds (available + in use).
    #[must_use]
    pub fn total(&self) -> usize {
        self.available + self.in_use
    }
}

/// Cumulative pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total successful acquisitions.
    pub acquisitions: u64,
    /// Total successful releases.
    pub releases: u64,
    /// Total resources ever constructed.
    pub created: u64,
    /// Total factory failures.
    pub construction_failures: u64,
    /// Total resources drained by `close_all` and handed to its closer,
    /// whether or not the closer had anything to shut down.
    pub drained: u64,
    /// Timed acquires that gave up.
    pub timeouts: u64,
    /// Acquires cancelled while waiting.
    pub interrupted: u64,
    /// Releases rejected as invalid.
    pub invalid_releases: u64,
}

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

type Factory<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Everything guarded by the bookkeeping lock.
struct State<T: Identify> {
    available: VecDeque<T>,
    in_use: HashSet<T::Id>,
    stats: PoolStats,
}

impl<T: Identify> State<T> {
    fn take_available(&mut self, order: ReuseOrder) -> Option<T> {
        match order {
            ReuseOrder::Fifo => self.available.pop_front(),
            ReuseOrder::Lifo => self.available.pop_back(),
        }
    }
}

/// Inner shared state for the pool.
struct Shared<T: Identify> {
    name: Arc<str>,
    capacity: usize,
    reuse: ReuseOrder,
    state: Mutex<State<T>>,
    /// One permit per slot not held by a caller (capacity - in use).
    admission: Semaphore,
    factory: Factory<T>,
}

// ---------------------------------------------------------------------------
// BoundedPool<T>
// ---------------------------------------------------------------------------

/// Bounded, thread-safe pool of expensive resources.
///
/// At most `capacity` resources exist at any time. Released resources are
/// reused; new ones are constructed lazily, only when none are available.
/// Cloning the pool is cheap and yields a handle to the same pool.
pub struct BoundedPool<T: Identify> {
    shared: Arc<Shared<T>>,
}

impl<T: Identify> Clone for BoundedPool<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Identify> fmt::Debug for BoundedPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedPool")
            .field("name", &self.shared.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl<T> BoundedPool<T>
where
    T: Identify + Send + 'static,
{
    /// Create a pool that builds resources with `factory`.
    ///
    /// No resource is constructed up front.
    ///
    /// # Errors
    /// Returns a configuration error if `config` is invalid (e.g. max_size == 0).
    pub fn new<F, Fut>(name: impl Into<String>, config: PoolConfig, factory: F) -> Result<Self>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        config.validate()?;
        let factory: Factory<T> = Arc::new(move || Box::pin(factory()));
        let name: String = name.into();
        Ok(Self {
            shared: Arc::new(Shared {
                name: name.into(),
                capacity: config.max_size,
                reuse: config.reuse,
                state: Mutex::new(State {
                    available: VecDeque::with_capacity(config.max_size),
                    in_use: HashSet::with_capacity(config.max_size),
                    stats: PoolStats::default(),
                }),
                admission: Semaphore::new(config.max_size),
                factory,
            }),
        })
    }

    /// Pool name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Maximum number of resources the pool may hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Acquire a resource, waiting as long as it takes.
    ///
    /// Dropping the returned future while it waits gives up the place in
    /// the queue without touching pool state.
    pub async fn acquire(&self) -> Result<T> {
        let permit = self
            .shared
            .admission
            .acquire()
            .await
            .map_err(|_| self.closed())?;
        self.checkout(permit).await
    }

    /// Acquire a resource unless `token` is cancelled first.
    ///
    /// # Errors
    /// Returns [`Error::Interrupted`] when the token fires before a permit is
    /// granted; no resource is constructed and pool state is unchanged.
    pub async fn acquire_cancellable(&self, token: &CancellationToken) -> Result<T> {
        let permit = tokio::select! {
            biased;
            () = token.cancelled() => {
                self.shared.state.lock().stats.interrupted += 1;
                tracing::debug!(pool = %self.shared.name, "Acquire interrupted");
                return Err(Error::Interrupted {
                    pool: self.shared.name.to_string(),
                });
            }
            permit = self.shared.admission.acquire() => permit.map_err(|_| self.closed())?,
        };
        self.checkout(permit).await
    }

    /// Acquire a resource, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when no slot frees up in time. A zero timeout
    /// only succeeds if a slot is free right now.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Option<T>> {
        let permit = if timeout.is_zero() {
            match self.shared.admission.try_acquire() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => return Ok(self.timed_out(timeout)),
                Err(TryAcquireError::Closed) => return Err(self.closed()),
            }
        } else {
            match tokio::time::timeout(timeout, self.shared.admission.acquire()).await {
                Ok(permit) => permit.map_err(|_| self.closed())?,
                Err(_) => return Ok(self.timed_out(timeout)),
            }
        };
        self.checkout(permit).await.map(Some)
    }

    /// Acquire a resource wrapped in a [`Lease`] that releases it on drop.
    pub async fn lease(&self) -> Result<Lease<T>> {
        let item = self.acquire().await?;
        Ok(Lease::new(item, self.clone()))
    }

    /// Timed variant of [`lease`](Self::lease).
    pub async fn lease_timeout(&self, timeout: Duration) -> Result<Option<Lease<T>>> {
        Ok(self
            .acquire_timeout(timeout)
            .await?
            .map(|item| Lease::new(item, self.clone())))
    }

    /// Return a resource to the pool.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRelease`] if the resource is not checked out
    /// from this pool (double release, or never acquired here). The rejected
    /// value is dropped and the counts do not change.
    pub fn release(&self, item: T) -> Result<()> {
        let id = item.id();
        {
            let mut state = self.shared.state.lock();
            if !state.in_use.remove(&id) {
                state.stats.invalid_releases += 1;
                drop(state);
                tracing::warn!(
                    pool = %self.shared.name,
                    resource_id = %id,
                    "Rejected invalid release"
                );
                return Err(Error::InvalidRelease {
                    pool: self.shared.name.to_string(),
                    resource_id: id.to_string(),
                });
            }
            state.available.push_back(item);
            state.stats.releases += 1;
        }
        // Wakes the longest-waiting acquirer, if any.
        self.shared.admission.add_permits(1);
        tracing::trace!(pool = %self.shared.name, resource_id = %id, "Released resource");
        Ok(())
    }

    /// Apply `closer` to every available resource and empty the pool.
    ///
    /// Checked-out resources are untouched; their holders still release them
    /// normally. The set to close is fixed when the lock is taken: a resource
    /// released while the closers run becomes available and is not closed.
    /// Returns the number of resources handed to `closer`.
    pub async fn close_all<F, Fut>(&self, mut closer: F) -> usize
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = ()>,
    {
        let drained: Vec<T> = {
            let mut state = self.shared.state.lock();
            let drained: Vec<T> = state.available.drain(..).collect();
            state.stats.drained += drained.len() as u64;
            drained
        };
        let count = drained.len();
        for item in drained {
            closer(item).await;
        }
        tracing::debug!(pool = %self.shared.name, drained = count, "Drained available resources");
        count
    }

}

impl<T: Identify> BoundedPool<T> {
    /// Number of resources waiting in the pool.
    #[must_use]
    pub fn available_count(&self) -> usize {
        self.snapshot().available
    }

    /// Number of resources checked out.
    #[must_use]
    pub fn in_use_count(&self) -> usize {
        self.snapshot().in_use
    }

    /// Number of resources the pool holds (available + in use).
    #[must_use]
    pub fn total_count(&self) -> usize {
        self.snapshot().total()
    }

    /// All counts, read atomically.
    #[must_use]
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.shared.state.lock();
        PoolSnapshot {
            available: state.available.len(),
            in_use: state.in_use.len(),
            capacity: self.shared.capacity,
        }
    }

    /// Cumulative statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.state.lock().stats.clone()
    }
}

impl<T> BoundedPool<T>
where
    T: Identify + Send + 'static,
{

    /// Turn an admission permit into a resource.
    ///
    /// The permit stays alive until the resource is recorded as in use, so
    /// a failing or cancelled factory hands the slot straight back.
    async fn checkout(&self, permit: SemaphorePermit<'_>) -> Result<T> {
        let shared = &self.shared;
        let recycled = {
            let mut state = shared.state.lock();
            let item = state.take_available(shared.reuse);
            if let Some(item) = &item {
                state.in_use.insert(item.id());
                state.stats.acquisitions += 1;
            }
            item
        };

        let item = match recycled {
            Some(item) => item,
            None => {
                let built = (shared.factory)().await;
                let mut state = shared.state.lock();
                match built {
                    Ok(item) if state.in_use.insert(item.id()) => {
                        state.stats.created += 1;
                        state.stats.acquisitions += 1;
                        drop(state);
                        tracing::debug!(
                            pool = %shared.name,
                            resource_id = %item.id(),
                            "Constructed resource"
                        );
                        item
                    }
                    Ok(item) => {
                        state.stats.construction_failures += 1;
                        return Err(Error::ResourceConstructionFailed {
                            pool: shared.name.to_string(),
                            source: format!("factory returned duplicate id '{}'", item.id())
                                .into(),
                        });
                    }
                    Err(source) => {
                        state.stats.construction_failures += 1;
                        drop(state);
                        tracing::warn!(
                            pool = %shared.name,
                            error = %source,
                            "Resource construction failed"
                        );
                        return Err(Error::ResourceConstructionFailed {
                            pool: shared.name.to_string(),
                            source: Box::new(source),
                        });
                    }
                }
            }
        };

        // Handed back by `release`.
        permit.forget();
        Ok(item)
    }

    fn timed_out(&self, timeout: Duration) -> Option<T> {
        self.shared.state.lock().stats.timeouts += 1;
        tracing::debug!(pool = %self.shared.name, ?timeout, "Acquire timed out");
        None
    }

    fn closed(&self) -> Error {
        Error::PoolClosed {
            pool: self.shared.name.to_string(),
        }
    }
}
