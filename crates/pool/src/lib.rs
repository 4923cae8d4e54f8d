//! # Keyward Pool
//!
//! Bounded, thread-safe object pools for expensive security resources.
//!
//! Three layers:
//! - [`BoundedPool`]: generic reusable-object pool with a hard capacity,
//!   blocking / cancellable / timed acquisition and strict release checks.
//! - [`Facade`]: typed pool for one [`PooledResource`] kind that opens
//!   resources on checkout and closes them on shutdown.
//! - [`PoolRegistry`]: one shared facade per [`ResourceKind`], created on
//!   first request and shut down together.
//!
//! ```no_run
//! use keyward_pool::{PoolRegistry, RegistryConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = PoolRegistry::with_default_pools(RegistryConfig::default())?;
//! let mut conn = registry.connection("FILE", true).await?;
//! conn.send("payload").await?;
//! registry.release_connection(conn)?;
//! registry.close_all_pools().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod facade;
pub mod guard;
pub mod kind;
pub mod pool;
pub mod registry;
pub mod resource;
pub mod resources;

pub use config::{Latency, PoolConfig, RegistryConfig, ReuseOrder};
pub use error::{BoxError, Error, Result};
pub use facade::{Checkout, CheckoutError, CloseSummary, ConnectionPool, EnginePool, Facade};
pub use guard::Lease;
pub use kind::{ConnectionSpec, EngineSpec, ResourceKind};
pub use pool::{BoundedPool, Identify, PoolSnapshot, PoolStats};
pub use registry::{PoolRegistry, ShutdownReport};
pub use resource::PooledResource;
pub use resources::{EncryptionEngine, SecureConnection};
