use super::{SagaBackend, check_version, ensure_active};
use crate::config::{TableBackendConfig, TablePartitionStrategy};
use crate::core::{Result, SagaError, VersionedSaga};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use uuid::Uuid;

/// Address of one entity in a partitioned table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableKey {
    pub partition_key: String,
    pub row_key: String,
}

/// Maps a correlation id onto a table address.
pub trait SagaKeyFormatter: Send + Sync {
    fn format(&self, correlation_id: Uuid) -> TableKey;
}

/// Every instance in one partition; the row key is the correlation id.
#[derive(Debug, Clone)]
pub struct ConstPartitionKeyFormatter {
    partition_key: String,
}

impl ConstPartitionKeyFormatter {
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
        }
    }
}

impl SagaKeyFormatter for ConstPartitionKeyFormatter {
    fn format(&self, correlation_id: Uuid) -> TableKey {
        TableKey {
            partition_key: self.partition_key.clone(),
            row_key: correlation_id.to_string(),
        }
    }
}

/// Spreads instances over a fixed number of partitions.
#[derive(Debug, Clone)]
pub struct HashedPartitionKeyFormatter {
    partitions: u32,
}

impl HashedPartitionKeyFormatter {
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
        }
    }
}

impl SagaKeyFormatter for HashedPartitionKeyFormatter {
    fn format(&self, correlation_id: Uuid) -> TableKey {
        let bucket = correlation_id.as_u128() % u128::from(self.partitions);
        TableKey {
            partition_key: format!("p{bucket:04}"),
            row_key: correlation_id.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct TableEntity {
    etag: u64,
    timestamp: DateTime<Utc>,
    payload: String,
}

/// Partition/row keyed store holding JSON payloads guarded by an ETag.
///
/// Mirrors the shape of cloud table stores: point reads and conditional
/// writes only, no secondary indexes, so it never exposes a query capability.
pub struct TableSagaBackend<S> {
    entities: RwLock<BTreeMap<TableKey, TableEntity>>,
    formatter: Box<dyn SagaKeyFormatter>,
    config: TableBackendConfig,
    marker: PhantomData<fn() -> S>,
}

impl<S: VersionedSaga> TableSagaBackend<S> {
    pub fn new(config: TableBackendConfig) -> Self {
        let formatter: Box<dyn SagaKeyFormatter> = match &config.partition {
            TablePartitionStrategy::SagaType => {
                Box::new(ConstPartitionKeyFormatter::new(S::saga_type()))
            }
            TablePartitionStrategy::Constant(partition) => {
                Box::new(ConstPartitionKeyFormatter::new(partition.clone()))
            }
            TablePartitionStrategy::Hashed { partitions } => {
                Box::new(HashedPartitionKeyFormatter::new(*partitions))
            }
        };
        Self {
            entities: RwLock::new(BTreeMap::new()),
            formatter,
            config,
            marker: PhantomData,
        }
    }

    /// Replaces the formatter derived from the partition strategy.
    pub fn with_key_formatter(mut self, formatter: impl SagaKeyFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn key_for(&self, correlation_id: Uuid) -> TableKey {
        self.formatter.format(correlation_id)
    }

    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn partition_count(&self, partition_key: &str) -> usize {
        self.entities
            .read()
            .await
            .keys()
            .filter(|key| key.partition_key == partition_key)
            .count()
    }

    /// Last write time of the entity, if present.
    pub async fn timestamp(&self, correlation_id: Uuid) -> Option<DateTime<Utc>> {
        let key = self.key_for(correlation_id);
        self.entities
            .read()
            .await
            .get(&key)
            .map(|entity| entity.timestamp)
    }

    async fn create(&self, instance: &mut S) -> Result<()> {
        let correlation_id = instance.correlation_id();
        let key = self.key_for(correlation_id);
        let mut entities = self.entities.write().await;
        if entities.contains_key(&key) {
            return Err(SagaError::Conflict(correlation_id));
        }

        let payload = serde_json::to_string(instance)?;
        instance.set_version(1);
        entities.insert(
            key,
            TableEntity {
                etag: 1,
                timestamp: Utc::now(),
                payload,
            },
        );
        event!(
            Level::TRACE,
            table = %self.config.table_name,
            correlation_id = %correlation_id,
            "table entity created"
        );
        Ok(())
    }
}

#[async_trait]
impl<S: VersionedSaga> SagaBackend<S> for TableSagaBackend<S> {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn insert(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.create(instance).await
    }

    async fn load(&self, correlation_id: Uuid, cancel: &CancellationToken) -> Result<Option<S>> {
        ensure_active(cancel)?;
        let key = self.key_for(correlation_id);
        let entities = self.entities.read().await;
        let Some(entity) = entities.get(&key) else {
            return Ok(None);
        };

        let mut instance: S = serde_json::from_str(&entity.payload)?;
        instance.set_version(entity.etag);
        Ok(Some(instance))
    }

    async fn add(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.create(instance).await
    }

    async fn update(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let correlation_id = instance.correlation_id();
        let key = self.key_for(correlation_id);
        let mut entities = self.entities.write().await;
        let entity = entities
            .get_mut(&key)
            .ok_or(SagaError::NotFound(correlation_id))?;
        check_version(correlation_id, instance.version(), entity.etag)?;

        let etag = entity.etag + 1;
        instance.set_version(etag);
        entity.payload = match serde_json::to_string(instance) {
            Ok(payload) => payload,
            Err(err) => {
                instance.set_version(etag - 1);
                return Err(err.into());
            }
        };
        entity.etag = etag;
        entity.timestamp = Utc::now();
        Ok(())
    }

    async fn delete(&self, instance: &S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let correlation_id = instance.correlation_id();
        let key = self.key_for(correlation_id);
        let mut entities = self.entities.write().await;
        let etag = entities
            .get(&key)
            .map(|entity| entity.etag)
            .ok_or(SagaError::NotFound(correlation_id))?;
        check_version(correlation_id, instance.version(), etag)?;

        entities.remove(&key);
        Ok(())
    }
}
