//! RAII lease for pooled resources

use crate::error::Result;
use crate::pool::{BoundedPool, Identify};

/// RAII guard that wraps a checked-out resource.
///
/// When the lease is dropped the resource goes back to its pool. Use
/// [`release`](Self::release) to observe the outcome, or
/// [`detach`](Self::detach) to take the resource out; a detached resource
/// is still counted as in use until it is passed to
/// [`BoundedPool::release`].
pub struct Lease<T>
where
    T: Identify + Send + 'static,
{
    resource: Option<T>,
    pool: BoundedPool<T>,
}

impl<T> Lease<T>
where
    T: Identify + Send + 'static,
{
    pub(crate) fn new(resource: T, pool: BoundedPool<T>) -> Self {
        Self {
            resource: Some(resource),
            pool,
        }
    }

    /// Return the resource to the pool now.
    pub fn release(mut self) -> Result<()> {
        match self.resource.take() {
            Some(resource) => self.pool.release(resource),
            None => Ok(()),
        }
    }

    /// Take the resource out of the lease without releasing it.
    #[must_use]
    pub fn detach(mut self) -> T {
        self.resource.take().expect("lease used after detach")
    }
}

impl<T> std::ops::Deref for Lease<T>
where
    T: Identify + Send + 'static,
{
    type Target = T;

    fn deref(&self) -> &T {
        self.resource.as_ref().expect("lease used after detach")
    }
}

impl<T> std::ops::DerefMut for Lease<T>
where
    T: Identify + Send + 'static,
{
    fn deref_mut(&mut self) -> &mut T {
        self.resource.as_mut().expect("lease used after detach")
    }
}

impl<T> Drop for Lease<T>
where
    T: Identify + Send + 'static,
{
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take()
            && let Err(e) = self.pool.release(resource)
        {
            tracing::error!(
                pool = %self.pool.name(),
                error = %e,
                "Lease failed to release resource"
            );
        }
    }
}

impl<T> std::fmt::Debug for Lease<T>
where
    T: Identify + Send + std::fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("pool", &self.pool.name())
            .field("resource", &self.resource)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::error::Error;

    #[derive(Debug)]
    struct Token(u32);

    impl Identify for Token {
        type Id = u32;

        fn id(&self) -> u32 {
            self.0
        }
    }

    fn pool() -> BoundedPool<Token> {
        BoundedPool::new("lease-test", PoolConfig::with_max_size(1), || async {
            Ok(Token(42))
        })
        .unwrap()
    }

    #[tokio::test]
    async fn lease_deref() {
        let pool = pool();
        let lease = pool.lease().await.unwrap();
        assert_eq!(lease.0, 42);
    }

    #[tokio::test]
    async fn lease_deref_mut() {
        let pool = pool();
        let mut lease = pool.lease().await.unwrap();
        lease.0 += 1;
        let token = lease.detach();
        assert_eq!(token.0, 43);
        // The id changed while checked out, so the pool refuses it.
        assert!(matches!(
            pool.release(token),
            Err(Error::InvalidRelease { .. })
        ));
    }

    #[tokio::test]
    async fn explicit_release_reports_success() {
        let pool = pool();
        let lease = pool.lease().await.unwrap();
        lease.release().unwrap();
        assert_eq!(pool.available_count(), 1);
    }

    #[tokio::test]
    async fn detach_keeps_resource_in_use() {
        let pool = pool();
        let token = pool.lease().await.unwrap().detach();
        assert_eq!(pool.in_use_count(), 1);
        pool.release(token).unwrap();
        assert_eq!(pool.in_use_count(), 0);
    }
}
