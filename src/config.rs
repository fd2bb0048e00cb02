use std::path::PathBuf;
use std::time::Duration;

/// Options applied by every repository context handed out by a repository.
#[derive(Debug, Clone, Default)]
pub struct SagaRepositoryOptions {
    /// Upper bound for a single backend call
    pub operation_timeout: Option<Duration>,
}

impl SagaRepositoryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call backend timeout
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

/// In-memory backend configuration
#[derive(Debug, Clone)]
pub struct InMemoryBackendConfig {
    /// Whether a deleted correlation id may be inserted again
    pub allow_key_reuse: bool,
}

impl Default for InMemoryBackendConfig {
    fn default() -> Self {
        Self {
            allow_key_reuse: true,
        }
    }
}

impl InMemoryBackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow_key_reuse(mut self, allow: bool) -> Self {
        self.allow_key_reuse = allow;
        self
    }
}

/// How the table backend spreads instances over partitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablePartitionStrategy {
    /// One partition named after the saga type.
    SagaType,
    /// One partition with a fixed name.
    Constant(String),
    /// `partitions` buckets derived from the correlation id.
    Hashed { partitions: u32 },
}

/// Table backend configuration
#[derive(Debug, Clone)]
pub struct TableBackendConfig {
    /// Logical table name, used in log fields
    pub table_name: String,

    /// Partition key strategy
    pub partition: TablePartitionStrategy,
}

impl Default for TableBackendConfig {
    fn default() -> Self {
        Self {
            table_name: "sagas".to_string(),
            partition: TablePartitionStrategy::SagaType,
        }
    }
}

impl TableBackendConfig {
    pub fn new(table_name: &str) -> Self {
        Self {
            table_name: table_name.to_string(),
            ..Self::default()
        }
    }

    pub fn partition(mut self, partition: TablePartitionStrategy) -> Self {
        self.partition = partition;
        self
    }
}

/// File backend configuration
#[derive(Debug, Clone)]
pub struct FileBackendConfig {
    /// Directory holding one JSON document per instance
    pub root: PathBuf,
}

impl FileBackendConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}
