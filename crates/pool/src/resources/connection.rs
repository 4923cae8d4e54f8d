//! Simulated secure connection to a storage backend.

use std::collections::VecDeque;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{Latency, simulate};
use crate::error::{Error, Result};
use crate::kind::{ConnectionSpec, ResourceKind};
use crate::pool::Identify;
use crate::resource::PooledResource;

/// Characters of a payload shown in trace logs.
const PREVIEW_CHARS: usize = 10;

/// A secure connection to a file, database or cloud backend.
///
/// The backend is simulated: sent payloads are queued locally and come back
/// from [`receive`](Self::receive) in order. Handshake costs come from the
/// injected [`Latency`].
#[derive(Debug)]
pub struct SecureConnection {
    id: Uuid,
    kind: ResourceKind,
    spec: ConnectionSpec,
    active: bool,
    latency: Latency,
    loopback: VecDeque<String>,
    opens: u32,
    sent: u64,
}

impl SecureConnection {
    /// Backend channel (`FILE`, `DATABASE`, ...).
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.spec.channel
    }

    /// Whether traffic is encrypted.
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.spec.encrypted
    }

    /// The spec this connection was built from.
    #[must_use]
    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    /// How many times the connection actually transitioned to active.
    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.opens
    }

    /// Payloads sent over this connection so far.
    #[must_use]
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Send a payload.
    ///
    /// # Errors
    /// Returns [`Error::NotActive`] if the connection is closed.
    pub async fn send(&mut self, data: &str) -> Result<()> {
        self.ensure_active()?;
        simulate(self.latency.transfer()).await;
        tracing::trace!(
            resource_id = %self.id,
            encrypted = self.spec.encrypted,
            preview = %preview(data),
            "Sending payload"
        );
        self.loopback.push_back(data.to_owned());
        self.sent += 1;
        Ok(())
    }

    /// Receive the oldest unread payload, if any.
    ///
    /// # Errors
    /// Returns [`Error::NotActive`] if the connection is closed.
    pub async fn receive(&mut self) -> Result<Option<String>> {
        self.ensure_active()?;
        simulate(self.latency.transfer()).await;
        let data = self.loopback.pop_front();
        if let Some(data) = &data {
            tracing::trace!(resource_id = %self.id, preview = %preview(data), "Received payload");
        }
        Ok(data)
    }

    fn ensure_active(&self) -> Result<()> {
        if self.active {
            Ok(())
        } else {
            Err(Error::not_active(self.id))
        }
    }
}

fn preview(data: &str) -> String {
    let mut shown: String = data.chars().take(PREVIEW_CHARS).collect();
    if shown.len() < data.len() {
        shown.push_str("...");
    }
    shown
}

impl Identify for SecureConnection {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl PooledResource for SecureConnection {
    type Spec = ConnectionSpec;

    fn kind_of(spec: &ConnectionSpec) -> ResourceKind {
        ResourceKind::Connection(spec.clone())
    }

    fn validate(spec: &ConnectionSpec) -> Result<()> {
        if spec.channel.is_empty() {
            return Err(Error::configuration("connection channel cannot be empty"));
        }
        Ok(())
    }

    async fn create(spec: ConnectionSpec, latency: Latency) -> Result<Self> {
        let id = Uuid::new_v4();
        tracing::debug!(resource_id = %id, kind = %spec, "Initializing secure connection");
        simulate(latency.construct()).await;
        Ok(Self {
            id,
            kind: ResourceKind::Connection(spec.clone()),
            spec,
            active: false,
            latency,
            loopback: VecDeque::new(),
            opens: 0,
            sent: 0,
        })
    }

    fn kind(&self) -> &ResourceKind {
        &self.kind
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn open(&mut self) -> Result<()> {
        if self.active {
            return Ok(());
        }
        simulate(self.latency.open()).await;
        self.active = true;
        self.opens += 1;
        tracing::debug!(resource_id = %self.id, "Opened secure connection");
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        simulate(self.latency.close()).await;
        self.active = false;
        self.loopback.clear();
        tracing::debug!(resource_id = %self.id, "Closed secure connection");
        Ok(())
    }
}
