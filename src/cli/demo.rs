use super::{Args, BackendKind, DATA_DIR_ENV};
use anyhow::{Context, bail};
use futures::future::join_all;
use sagarepo::prelude::consumer::*;
use sagarepo::{
    FileBackendConfig, FileSagaBackend, InMemorySagaBackend, SagaBackend, SagaQuery,
    TableBackendConfig, TableSagaBackend,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, event};
use uuid::Uuid;

const MAX_UPDATE_ATTEMPTS: usize = 256;

type DemoRepository = SagaRepository<VisitCounter, dyn SagaBackend<VisitCounter>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitCounter {
    id: Uuid,
    visits: u64,
    #[serde(default)]
    version: u64,
}

impl VisitCounter {
    fn first_visit(id: Uuid) -> Self {
        Self {
            id,
            visits: 1,
            version: 0,
        }
    }
}

impl Saga for VisitCounter {
    fn correlation_id(&self) -> Uuid {
        self.id
    }
}

impl VersionedSaga for VisitCounter {
    fn version(&self) -> u64 {
        self.version
    }

    fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}

#[derive(Debug)]
struct Visit {
    counter_id: Uuid,
}

enum Outcome {
    Inserted,
    Loaded { retries: usize },
}

#[derive(Debug, Default)]
pub struct DemoSummary {
    pub backend: &'static str,
    pub inserted: usize,
    pub loaded: usize,
    pub version_retries: usize,
    pub counters: BTreeMap<Uuid, u64>,
}

impl DemoSummary {
    pub fn total_visits(&self) -> u64 {
        self.counters.values().sum()
    }

    pub fn print(&self) {
        println!("backend:          {}", self.backend);
        println!("inserted:         {}", self.inserted);
        println!("loaded:           {}", self.loaded);
        println!("version retries:  {}", self.version_retries);
        for (id, visits) in &self.counters {
            println!("  {id}  {visits}");
        }
        println!("total visits:     {}", self.total_visits());
    }
}

pub async fn run(args: &Args) -> anyhow::Result<DemoSummary> {
    if args.keys == 0 {
        bail!("--keys must be at least 1");
    }

    // Keeps a scratch directory alive until the run is over.
    let mut _scratch = None;
    let backend: Arc<dyn SagaBackend<VisitCounter>> = match args.backend {
        BackendKind::Memory => Arc::new(InMemorySagaBackend::<VisitCounter>::new()),
        BackendKind::Table => Arc::new(TableSagaBackend::<VisitCounter>::new(
            TableBackendConfig::new("visit_counters"),
        )),
        BackendKind::File => {
            let root = match data_dir(args) {
                Some(root) => root,
                None => {
                    let dir = tempfile::tempdir().context("create scratch data dir")?;
                    let root = dir.path().to_path_buf();
                    _scratch = Some(dir);
                    root
                }
            };
            Arc::new(FileSagaBackend::<VisitCounter>::open(FileBackendConfig::new(root)).await?)
        }
    };

    let mut options = SagaRepositoryOptions::new();
    if let Some(ms) = args.timeout_ms {
        options = options.operation_timeout(Duration::from_millis(ms));
    }
    let repository: DemoRepository = SagaRepository::from_shared(backend).with_options(options);

    let keys: Vec<Uuid> = (0..args.keys).map(|_| Uuid::new_v4()).collect();
    let shutdown = CancellationToken::new();
    let tasks = (0..args.messages).map(|i| {
        let repository = repository.clone();
        let consume = ConsumeContext::new(Visit {
            counter_id: keys[i % keys.len()],
        })
        .with_cancellation(shutdown.child_token());
        tokio::spawn(async move { handle_visit(&repository, &consume).await })
    });

    let mut summary = DemoSummary {
        backend: repository.backend().name(),
        ..DemoSummary::default()
    };
    for result in join_all(tasks).await {
        match result.context("visit task failed")?? {
            Outcome::Inserted => summary.inserted += 1,
            Outcome::Loaded { retries } => {
                summary.loaded += 1;
                summary.version_retries += retries;
            }
        }
    }

    summary.counters = collect_counters(&repository, &keys, shutdown).await?;
    Ok(summary)
}

fn data_dir(args: &Args) -> Option<PathBuf> {
    args.data_dir
        .clone()
        .or_else(|| env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
}

async fn handle_visit(
    repository: &DemoRepository,
    consume: &ConsumeContext<Visit>,
) -> anyhow::Result<Outcome> {
    let context = repository.context(consume);
    let counter_id = consume.message().counter_id;

    if context
        .insert(VisitCounter::first_visit(counter_id))
        .await
        .is_some()
    {
        return Ok(Outcome::Inserted);
    }

    for retries in 0..MAX_UPDATE_ATTEMPTS {
        let Some(mut saga) = context.load(counter_id).await? else {
            bail!("counter {counter_id} missing after a failed insert");
        };
        saga.saga_mut().visits += 1;
        match context.update(&mut saga).await {
            Ok(()) => return Ok(Outcome::Loaded { retries }),
            Err(SagaError::ConcurrencyViolation { .. }) => {
                event!(Level::DEBUG, %counter_id, retries, "visit lost a version race");
            }
            Err(err) => return Err(err.into()),
        }
    }
    bail!("counter {counter_id} still conflicting after {MAX_UPDATE_ATTEMPTS} attempts")
}

async fn collect_counters(
    repository: &DemoRepository,
    keys: &[Uuid],
    cancel: CancellationToken,
) -> anyhow::Result<BTreeMap<Uuid, u64>> {
    let queries = repository.query_context(cancel);
    let ids = match queries.query(&SagaQuery::all()).await {
        Ok(matched) => matched.into_ids(),
        Err(err) if err.is_not_implemented_by_design() => keys.to_vec(),
        Err(err) => return Err(err.into()),
    };

    let mut counters = BTreeMap::new();
    for id in ids {
        if let Some(counter) = queries.load(id).await? {
            counters.insert(id, counter.visits);
        }
    }
    Ok(counters)
}
