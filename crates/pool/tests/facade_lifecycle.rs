//! Facade activation and shutdown behaviour.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Flaky, FlakySpec};
use keyward_pool::{
    CheckoutError, ConnectionPool, ConnectionSpec, Error, Facade, Identify, Latency, PoolConfig,
    PooledResource,
};
use pretty_assertions::assert_eq;

fn flaky_pool(spec: &FlakySpec, max_size: usize) -> Facade<Flaky> {
    Facade::new(spec.clone(), PoolConfig::with_max_size(max_size), Latency::NONE).unwrap()
}

// ---------------------------------------------------------------------------
// Activation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activation_failure_hands_the_resource_back() {
    let spec = FlakySpec::default();
    spec.set_fail_open(true);
    let pool = flaky_pool(&spec, 1);

    let Err(CheckoutError::Activation { resource, error }) = pool.get().await else {
        panic!("expected an activation failure");
    };
    assert!(matches!(error, Error::ResourceActivationFailed { .. }));
    assert!(!resource.is_active());
    assert_eq!(pool.in_use_count(), 1, "the failed resource is still checked out");

    let failed_id = resource.id();
    pool.release(resource).unwrap();
    assert_eq!(pool.available_count(), 1);

    spec.set_fail_open(false);
    let resource = pool.get().await.unwrap();
    assert!(resource.is_active());
    assert_eq!(resource.id(), failed_id, "the same resource is reused");
}

#[tokio::test]
async fn activation_failure_on_lease_keeps_the_lease() {
    let spec = FlakySpec::default();
    spec.set_fail_open(true);
    let pool = flaky_pool(&spec, 1);

    let err = pool.lease().await.unwrap_err();
    assert!(matches!(err.error(), Error::ResourceActivationFailed { .. }));
    // Dropping the lease inside the error returns the resource.
    drop(err);
    assert_eq!(pool.snapshot().available, 1);
    assert_eq!(pool.in_use_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn checkout_dropped_while_opening_returns_the_slot() {
    let latency = Latency {
        open_ms: 50,
        ..Latency::NONE
    };
    let pool = ConnectionPool::new(
        ConnectionSpec::new("CLOUD", true),
        PoolConfig::with_max_size(1),
        latency,
    )
    .unwrap();

    let gave_up = tokio::time::timeout(Duration::from_millis(10), pool.get()).await;
    assert!(gave_up.is_err(), "open takes longer than the caller waits");
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.available_count(), 1);

    let conn = pool
        .get_timeout(Duration::from_secs(5))
        .await
        .unwrap()
        .expect("the slot is free again");
    assert!(conn.is_active());
    assert_eq!(pool.total_count(), 1);
}

#[tokio::test]
async fn recycled_resources_are_reopened() {
    let pool = ConnectionPool::new(
        ConnectionSpec::new("DATABASE", true),
        PoolConfig::with_max_size(1),
        Latency::NONE,
    )
    .unwrap();

    let mut conn = pool.get().await.unwrap();
    // A holder may close a resource before handing it back.
    conn.close().await.unwrap();
    pool.release(conn).unwrap();

    let conn = pool.get().await.unwrap();
    assert!(conn.is_active());
    assert_eq!(conn.open_count(), 2);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn close_all_closes_available_and_spares_in_use() {
    let spec = FlakySpec::default();
    let pool = flaky_pool(&spec, 3);

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    let held = pool.get().await.unwrap();
    pool.release(a).unwrap();
    pool.release(b).unwrap();

    let summary = pool.close_all().await;
    assert_eq!(summary.closed, 2);
    assert!(summary.failures.is_empty());
    assert_eq!(spec.closes(), 2);
    assert_eq!(pool.available_count(), 0);
    assert_eq!(pool.in_use_count(), 1);
    assert!(held.is_active(), "checked-out resources are not closed");

    let err = pool.get().await.unwrap_err();
    assert!(matches!(err.into_error(), Error::PoolClosed { .. }));
    assert!(pool.get_timeout(Duration::ZERO).await.is_err());

    // Late returns are accepted and swept by the next close.
    pool.release(held).unwrap();
    assert_eq!(pool.available_count(), 1);
    let sweep = pool.close_all().await;
    assert_eq!(sweep.closed, 1);
    assert_eq!(spec.closes(), 3);
}

#[tokio::test]
async fn close_failures_are_collected_not_raised() {
    let spec = FlakySpec::default();
    spec.set_fail_close(true);
    let pool = flaky_pool(&spec, 2);

    let a = pool.get().await.unwrap();
    let b = pool.get().await.unwrap();
    pool.release(a).unwrap();
    pool.release(b).unwrap();

    let summary = pool.close_all().await;
    assert_eq!(summary.drained, 2);
    assert_eq!(summary.closed, 0);
    assert_eq!(summary.failures.len(), 2);
    assert_eq!(pool.total_count(), 0, "failed resources are discarded");
}

#[tokio::test]
async fn inactive_resources_are_not_closed_again() {
    let spec = FlakySpec::default();
    let pool = flaky_pool(&spec, 1);

    let mut resource = pool.get().await.unwrap();
    resource.close().await.unwrap();
    pool.release(resource).unwrap();
    assert_eq!(spec.closes(), 1);

    let summary = pool.close_all().await;
    assert_eq!(summary.drained, 1);
    assert_eq!(summary.closed, 0, "nothing was left to close");
    assert_eq!(pool.stats().drained, 1);
    assert_eq!(spec.closes(), 1);
}

#[tokio::test]
async fn waiter_admitted_after_close_gets_nothing() {
    let spec = FlakySpec::default();
    let pool = Arc::new(flaky_pool(&spec, 1));
    let held = pool.get().await.unwrap();

    let waiter = tokio::spawn({
        let pool = Arc::clone(&pool);
        async move { pool.get().await.map(|_| ()).map_err(CheckoutError::into_error) }
    });
    // Let the waiter park on the full pool.
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    pool.close_all().await;
    pool.release(held).unwrap();

    let err = waiter.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::PoolClosed { .. }));
    assert_eq!(pool.in_use_count(), 0);
    assert_eq!(pool.available_count(), 1, "left for the next sweep");
}
