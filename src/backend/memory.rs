use super::{SagaBackend, SagaQuery, SagaQueryBackend, check_version, ensure_active};
use crate::config::InMemoryBackendConfig;
use crate::core::{Result, SagaError, VersionedSaga};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use uuid::Uuid;

struct InMemoryState<S> {
    instances: HashMap<Uuid, S>,
    retired: HashSet<Uuid>,
}

/// Process-local saga store with optimistic versioning and query support.
///
/// The write lock is held across the existence check and the insert, which
/// is what makes `insert` atomic per correlation id.
pub struct InMemorySagaBackend<S> {
    state: RwLock<InMemoryState<S>>,
    config: InMemoryBackendConfig,
}

impl<S: VersionedSaga> Default for InMemorySagaBackend<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: VersionedSaga> InMemorySagaBackend<S> {
    pub fn new() -> Self {
        Self::with_config(InMemoryBackendConfig::default())
    }

    pub fn with_config(config: InMemoryBackendConfig) -> Self {
        Self {
            state: RwLock::new(InMemoryState {
                instances: HashMap::new(),
                retired: HashSet::new(),
            }),
            config,
        }
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.instances.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stored copy of an instance, bypassing any repository context.
    pub async fn get(&self, correlation_id: Uuid) -> Option<S> {
        self.state.read().await.instances.get(&correlation_id).cloned()
    }

    async fn create(&self, instance: &mut S, operation: &'static str) -> Result<()> {
        let correlation_id = instance.correlation_id();
        let mut state = self.state.write().await;
        let retired = !self.config.allow_key_reuse && state.retired.contains(&correlation_id);
        if state.instances.contains_key(&correlation_id) || retired {
            return Err(SagaError::Conflict(correlation_id));
        }

        instance.set_version(1);
        state.instances.insert(correlation_id, instance.clone());
        event!(
            Level::TRACE,
            correlation_id = %correlation_id,
            operation,
            "in-memory saga stored"
        );
        Ok(())
    }
}

#[async_trait]
impl<S: VersionedSaga> SagaBackend<S> for InMemorySagaBackend<S> {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn insert(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.create(instance, "insert").await
    }

    async fn load(&self, correlation_id: Uuid, cancel: &CancellationToken) -> Result<Option<S>> {
        ensure_active(cancel)?;
        Ok(self.get(correlation_id).await)
    }

    async fn add(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.create(instance, "add").await
    }

    async fn update(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let correlation_id = instance.correlation_id();
        let mut state = self.state.write().await;
        let stored = state
            .instances
            .get_mut(&correlation_id)
            .ok_or(SagaError::NotFound(correlation_id))?;
        check_version(correlation_id, instance.version(), stored.version())?;

        instance.set_version(stored.version() + 1);
        *stored = instance.clone();
        Ok(())
    }

    async fn delete(&self, instance: &S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let correlation_id = instance.correlation_id();
        let mut state = self.state.write().await;
        let stored_version = state
            .instances
            .get(&correlation_id)
            .map(|stored| stored.version())
            .ok_or(SagaError::NotFound(correlation_id))?;
        check_version(correlation_id, instance.version(), stored_version)?;

        state.instances.remove(&correlation_id);
        if !self.config.allow_key_reuse {
            state.retired.insert(correlation_id);
        }
        Ok(())
    }

    fn as_queryable(&self) -> Option<&dyn SagaQueryBackend<S>> {
        Some(self)
    }
}

#[async_trait]
impl<S: VersionedSaga> SagaQueryBackend<S> for InMemorySagaBackend<S> {
    async fn query(&self, query: &SagaQuery<S>, cancel: &CancellationToken) -> Result<Vec<Uuid>> {
        ensure_active(cancel)?;
        let state = self.state.read().await;
        let mut ids: Vec<Uuid> = state
            .instances
            .values()
            .filter(|instance| query.matches(instance))
            .map(|instance| instance.correlation_id())
            .collect();
        ids.sort();
        Ok(ids)
    }
}
