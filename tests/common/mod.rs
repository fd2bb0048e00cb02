#![allow(dead_code)]

use async_trait::async_trait;
use sagarepo::{CancellationToken, Result, Saga, SagaBackend, SagaError, VersionedSaga};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderState {
    pub id: Uuid,
    pub customer: String,
    pub status: String,
    #[serde(default)]
    pub version: u64,
}

impl OrderState {
    pub fn new(id: Uuid, customer: &str) -> Self {
        Self {
            id,
            customer: customer.to_string(),
            status: "submitted".to_string(),
            version: 0,
        }
    }
}

impl Saga for OrderState {
    fn correlation_id(&self) -> Uuid {
        self.id
    }
}

impl VersionedSaga for OrderState {
    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[derive(Debug, Clone)]
pub struct SubmitOrder {
    pub order_id: Uuid,
    pub customer: String,
}

#[derive(Debug, Clone)]
pub struct OrderAccepted {
    pub order_id: Uuid,
}

/// Counts every call and answers after an optional delay.
///
/// Loads always miss and writes always succeed unless the token fires during
/// the delay; it has no query capability.
#[derive(Default)]
pub struct RecordingBackend {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
}

impl RecordingBackend {
    pub fn slow(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Some(delay),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn touch(&self, cancel: &CancellationToken) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let Some(delay) = self.delay else {
            return Ok(());
        };
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = cancel.cancelled() => Err(SagaError::Cancelled),
        }
    }
}

#[async_trait]
impl SagaBackend<OrderState> for RecordingBackend {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn insert(&self, instance: &mut OrderState, cancel: &CancellationToken) -> Result<()> {
        self.touch(cancel).await?;
        instance.set_version(1);
        Ok(())
    }

    async fn load(&self, _: Uuid, cancel: &CancellationToken) -> Result<Option<OrderState>> {
        self.touch(cancel).await?;
        Ok(None)
    }

    async fn add(&self, instance: &mut OrderState, cancel: &CancellationToken) -> Result<()> {
        self.touch(cancel).await?;
        instance.set_version(1);
        Ok(())
    }

    async fn update(&self, _: &mut OrderState, cancel: &CancellationToken) -> Result<()> {
        self.touch(cancel).await?;
        Ok(())
    }

    async fn delete(&self, instance: &OrderState, cancel: &CancellationToken) -> Result<()> {
        self.touch(cancel).await?;
        Err(SagaError::NotFound(instance.id))
    }
}
