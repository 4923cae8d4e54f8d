//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use keyward_pool::{
    BoundedPool, Error, Identify, Latency, PoolConfig, PooledResource, ResourceKind, Result,
};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Ticket: minimal pooled value for BoundedPool tests
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq, Eq)]
pub struct Ticket(pub u64);

impl Identify for Ticket {
    type Id = u64;

    fn id(&self) -> u64 {
        self.0
    }
}

/// Pool of tickets numbered from zero, plus its construction counter.
pub fn ticket_pool(config: PoolConfig) -> (BoundedPool<Ticket>, Arc<AtomicU64>) {
    let created = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&created);
    let pool = BoundedPool::new("tickets", config, move || {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(Ticket(id)) }
    })
    .unwrap();
    (pool, created)
}

// ---------------------------------------------------------------------------
// Flaky: resource whose open/close can be made to fail
// ---------------------------------------------------------------------------

/// Switches shared by every `Flaky` built from one spec.
#[derive(Debug, Clone, Default)]
pub struct FlakySpec {
    pub fail_open: Arc<AtomicBool>,
    pub fail_close: Arc<AtomicBool>,
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
}

impl FlakySpec {
    pub fn kind() -> ResourceKind {
        ResourceKind::connection("FLAKY", false)
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Flaky {
    id: Uuid,
    kind: ResourceKind,
    spec: FlakySpec,
    active: bool,
}

impl Identify for Flaky {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl PooledResource for Flaky {
    type Spec = FlakySpec;

    fn kind_of(_spec: &FlakySpec) -> ResourceKind {
        FlakySpec::kind()
    }

    async fn create(spec: FlakySpec, _latency: Latency) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4(),
            kind: FlakySpec::kind(),
            spec,
            active: false,
        })
    }

    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn open(&mut self) -> Result<()> {
        if self.spec.fail_open.load(Ordering::SeqCst) {
            return Err(Error::configuration("handshake refused"));
        }
        self.spec.opens.fetch_add(1, Ordering::SeqCst);
        self.active = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.spec.closes.fetch_add(1, Ordering::SeqCst);
        if self.spec.fail_close.load(Ordering::SeqCst) {
            return Err(Error::configuration("close refused"));
        }
        self.active = false;
        Ok(())
    }
}
