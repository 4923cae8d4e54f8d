//! Core resource trait
//!
//! A `PooledResource` knows how to build itself from a spec and how to move
//! between the active and inactive states. Pools never look past this
//! trait: they have no idea what a connection or an engine actually does.

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::Latency;
use crate::error::Result;
use crate::kind::ResourceKind;
use crate::pool::Identify;

/// A resource that can live in a [`Facade`](crate::Facade).
///
/// Lifecycle: `CREATED → ACTIVE → INACTIVE → ACTIVE → … → CLOSED`.
/// `open` and `close` must be idempotent, and data operations on an
/// inactive resource must fail with [`Error::NotActive`](crate::Error::NotActive)
/// rather than opening it implicitly.
#[async_trait]
pub trait PooledResource: Identify<Id = Uuid> + Send + Sync + Sized + 'static {
    /// Construction parameters shared by every resource of one pool.
    type Spec: Clone + std::fmt::Debug + Send + Sync + 'static;

    /// Registry key for resources built from `spec`.
    fn kind_of(spec: &Self::Spec) -> ResourceKind;

    /// Reject specs this resource type cannot serve.
    fn validate(_spec: &Self::Spec) -> Result<()> {
        Ok(())
    }

    /// Build a new, inactive resource. May be slow.
    async fn create(spec: Self::Spec, latency: Latency) -> Result<Self>;

    /// The kind this resource was built for.
    fn kind(&self) -> &ResourceKind;

    /// Whether the resource is open.
    fn is_active(&self) -> bool;

    /// Open the resource. A no-op when already active.
    async fn open(&mut self) -> Result<()>;

    /// Close the resource. A no-op when already inactive.
    async fn close(&mut self) -> Result<()>;
}
