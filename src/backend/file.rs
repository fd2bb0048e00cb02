use super::{SagaBackend, check_version, ensure_active};
use crate::config::FileBackendConfig;
use crate::core::{Result, SagaError, VersionedSaga};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::fs;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{Level, event};
use uuid::Uuid;

const DOCUMENT_EXTENSION: &str = "json";

#[derive(Serialize, Deserialize)]
struct StoredSaga<S> {
    version: u64,
    updated_at: DateTime<Utc>,
    saga: S,
}

/// One JSON document per instance under a root directory.
///
/// Documents are always written to a temporary file first and then moved into
/// place, so readers never see a partial document. Creation uses a no-clobber
/// rename, which the file system performs atomically.
pub struct FileSagaBackend<S> {
    root: PathBuf,
    // Serializes check-then-write for update/delete within this process.
    write_lock: Mutex<()>,
    marker: PhantomData<fn() -> S>,
}

impl<S: VersionedSaga> FileSagaBackend<S> {
    pub async fn open(config: FileBackendConfig) -> Result<Self> {
        fs::create_dir_all(&config.root).await?;
        Ok(Self {
            root: config.root,
            write_lock: Mutex::new(()),
            marker: PhantomData,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, correlation_id: Uuid) -> PathBuf {
        self.root
            .join(format!("{}.{}", correlation_id.hyphenated(), DOCUMENT_EXTENSION))
    }

    async fn read_document(&self, correlation_id: Uuid) -> Result<Option<StoredSaga<S>>> {
        let bytes = match fs::read(self.document_path(correlation_id)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Writes the document unless `cancel` fires before the final rename.
    async fn write_document(
        &self,
        instance: &S,
        version: u64,
        overwrite: bool,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let correlation_id = instance.correlation_id();
        let document = StoredSaga {
            version,
            updated_at: Utc::now(),
            saga: instance.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&document)?;
        let root = self.root.clone();
        let target = self.document_path(correlation_id);
        let cancel = cancel.clone();

        let outcome = tokio::task::spawn_blocking(move || -> std::io::Result<bool> {
            let mut file = NamedTempFile::new_in(&root)?;
            file.write_all(&bytes)?;
            file.as_file().sync_all()?;
            // Commit point: past the rename the document is visible.
            if cancel.is_cancelled() {
                return Ok(false);
            }
            if overwrite {
                file.persist(&target).map_err(|err| err.error)?;
            } else {
                file.persist_noclobber(&target).map_err(|err| err.error)?;
            }
            Ok(true)
        })
        .await
        .map_err(|err| SagaError::Backend(format!("file write task failed: {err}")))?;

        match outcome {
            Ok(true) => Ok(()),
            Ok(false) => Err(SagaError::Cancelled),
            Err(err) if !overwrite && err.kind() == ErrorKind::AlreadyExists => {
                Err(SagaError::Conflict(correlation_id))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn create(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        self.write_document(instance, 1, false, cancel).await?;
        instance.set_version(1);
        event!(
            Level::TRACE,
            root = %self.root.display(),
            correlation_id = %instance.correlation_id(),
            "saga document created"
        );
        Ok(())
    }
}

#[async_trait]
impl<S: VersionedSaga> SagaBackend<S> for FileSagaBackend<S> {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn insert(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.create(instance, cancel).await
    }

    async fn load(&self, correlation_id: Uuid, cancel: &CancellationToken) -> Result<Option<S>> {
        ensure_active(cancel)?;
        Ok(self.read_document(correlation_id).await?.map(|document| {
            let mut saga = document.saga;
            saga.set_version(document.version);
            saga
        }))
    }

    async fn add(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        self.create(instance, cancel).await
    }

    async fn update(&self, instance: &mut S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let correlation_id = instance.correlation_id();
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read_document(correlation_id)
            .await?
            .ok_or(SagaError::NotFound(correlation_id))?;
        check_version(correlation_id, instance.version(), stored.version)?;

        let version = stored.version + 1;
        self.write_document(instance, version, true, cancel).await?;
        instance.set_version(version);
        Ok(())
    }

    async fn delete(&self, instance: &S, cancel: &CancellationToken) -> Result<()> {
        ensure_active(cancel)?;
        let correlation_id = instance.correlation_id();
        let _guard = self.write_lock.lock().await;
        let stored = self
            .read_document(correlation_id)
            .await?
            .ok_or(SagaError::NotFound(correlation_id))?;
        check_version(correlation_id, instance.version(), stored.version)?;
        ensure_active(cancel)?;

        match fs::remove_file(self.document_path(correlation_id)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(SagaError::NotFound(correlation_id))
            }
            Err(err) => Err(err.into()),
        }
    }
}
