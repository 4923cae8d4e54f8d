//! Error types for pooling operations
use thiserror::Error;

/// Boxed error returned by resource constructors and activation hooks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for pooling operations
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure the pools, facades and registry can report.
///
/// Bookkeeping faults (`InvalidRelease`, `PoolClosed`) are caller bugs and are
/// never retried internally. Resource faults (`ResourceConstructionFailed`,
/// `ResourceActivationFailed`) are surfaced to the caller, who owns the retry
/// policy. An acquire timeout is not an error: timed acquires return `None`.
#[derive(Error, Debug)]
pub enum Error {
    /// A blocking acquire was cancelled before a resource was granted
    #[error("Acquire on pool '{pool}' was interrupted")]
    Interrupted {
        /// The pool identifier
        pool: String,
    },

    /// A resource was released that this pool does not hold as in-use
    #[error("Resource '{resource_id}' is not checked out from pool '{pool}'")]
    InvalidRelease {
        /// The pool identifier
        pool: String,
        /// Identity of the rejected resource
        resource_id: String,
    },

    /// The resource factory failed; no admission token was consumed
    #[error("Failed to construct a resource for pool '{pool}': {source}")]
    ResourceConstructionFailed {
        /// The pool identifier
        pool: String,
        /// The underlying error
        #[source]
        source: BoxError,
    },

    /// The resource was acquired but could not be opened
    #[error("Failed to activate resource '{resource_id}' from pool '{pool}': {source}")]
    ResourceActivationFailed {
        /// The pool identifier
        pool: String,
        /// Identity of the resource that stayed inactive
        resource_id: String,
        /// The underlying error
        #[source]
        source: BoxError,
    },

    /// The pool or registry has been shut down
    #[error("Pool '{pool}' is closed")]
    PoolClosed {
        /// The pool identifier
        pool: String,
    },

    /// A data operation was attempted on an inactive resource
    #[error("Resource '{resource_id}' is not active")]
    NotActive {
        /// The resource identifier
        resource_id: String,
    },

    /// Pool or registry configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// An encryption engine operation failed
    #[error("Crypto operation failed on engine '{resource_id}': {reason}")]
    Crypto {
        /// The engine identifier
        resource_id: String,
        /// The failure reason
        reason: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a not-active error for the given resource
    pub fn not_active(resource_id: impl ToString) -> Self {
        Self::NotActive {
            resource_id: resource_id.to_string(),
        }
    }

    /// Check if retrying the same operation could succeed.
    ///
    /// Only faults of the resource itself qualify; bookkeeping faults are
    /// programmer errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ResourceConstructionFailed { .. }
                | Self::ResourceActivationFailed { .. }
                | Self::Interrupted { .. }
        )
    }

    /// Get the pool identifier associated with this error (if any)
    #[must_use]
    pub fn pool(&self) -> Option<&str> {
        match self {
            Self::Interrupted { pool }
            | Self::InvalidRelease { pool, .. }
            | Self::ResourceConstructionFailed { pool, .. }
            | Self::ResourceActivationFailed { pool, .. }
            | Self::PoolClosed { pool } => Some(pool),
            Self::NotActive { .. } | Self::Configuration { .. } | Self::Crypto { .. } => None,
        }
    }
}
