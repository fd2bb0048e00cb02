/// Repository context tests
///
/// Access-mode protocol, persistence pass-through and cancellation of the
/// per-message repository context.
/// Run with: cargo test --test repository_context_tests
mod common;

use async_trait::async_trait;
use common::{OrderAccepted, OrderState, RecordingBackend, SubmitOrder};
use sagarepo::{
    CancellationToken, ConsumeContext, FileBackendConfig, FileSagaBackend, InMemorySagaBackend,
    Result, SagaBackend, SagaConsumeContextMode, SagaError, SagaRepository,
    SagaRepositoryOptions, TableBackendConfig, TableSagaBackend,
};
use std::task::Poll;
use std::time::Duration;
use tempfile::tempdir;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

fn submit(order_id: Uuid) -> ConsumeContext<SubmitOrder> {
    ConsumeContext::new(SubmitOrder {
        order_id,
        customer: "acme".to_string(),
    })
    .with_correlation_id(order_id)
}

#[tokio::test]
async fn test_mode_matches_the_producing_operation() {
    let repository = SagaRepository::new(InMemorySagaBackend::<OrderState>::new());
    let consume = submit(Uuid::new_v4());
    let context = repository.context(&consume);

    let added = context.add(OrderState::new(Uuid::new_v4(), "a"));
    assert_eq!(added.mode(), SagaConsumeContextMode::Add);

    let order_id = Uuid::new_v4();
    let inserted = context
        .insert(OrderState::new(order_id, "b"))
        .await
        .expect("fresh key inserts");
    assert_eq!(inserted.mode(), SagaConsumeContextMode::Insert);

    let loaded = context.load(order_id).await.unwrap().expect("inserted key loads");
    assert_eq!(loaded.mode(), SagaConsumeContextMode::Load);
    assert_eq!(loaded.saga(), inserted.saga());
    assert_eq!(loaded.message().order_id, consume.message().order_id);
}

#[tokio::test]
async fn test_add_does_not_touch_the_backend_until_saved() {
    let repository = SagaRepository::new(InMemorySagaBackend::<OrderState>::new());
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);

    let mut added = context.add(OrderState::new(order_id, "acme"));
    assert!(repository.backend().is_empty().await);

    assert_ok!(context.save(&mut added).await);
    assert_eq!(added.saga().version, 1);
    assert_eq!(repository.backend().get(order_id).await, Some(added.saga().clone()));
}

#[tokio::test]
async fn test_saving_an_existing_key_is_a_conflict() {
    let repository = SagaRepository::new(InMemorySagaBackend::<OrderState>::new());
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);

    assert!(context.insert(OrderState::new(order_id, "first")).await.is_some());
    let mut added = context.add(OrderState::new(order_id, "second"));
    let err = context.save(&mut added).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_update_and_delete_pass_through_versions() {
    let repository = SagaRepository::new(TableSagaBackend::<OrderState>::new(
        TableBackendConfig::new("orders"),
    ));
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);

    let mut inserted = context.insert(OrderState::new(order_id, "acme")).await.unwrap();
    let stale = context.load(order_id).await.unwrap().unwrap();

    inserted.saga_mut().status = "accepted".to_string();
    assert_ok!(context.update(&mut inserted).await);
    assert_eq!(inserted.saga().version, 2);

    let err = context.delete(&stale).await.unwrap_err();
    assert!(matches!(err, SagaError::ConcurrencyViolation { expected: 1, actual: 2, .. }));

    inserted.set_completed();
    assert!(inserted.is_completed());
    assert_ok!(context.delete(&inserted).await);
    assert!(context.load(order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_discard_never_writes() {
    let repository = SagaRepository::new(RecordingBackend::default());
    let consume = submit(Uuid::new_v4());
    let context = repository.context(&consume);

    let added = context.add(OrderState::new(Uuid::new_v4(), "acme"));
    assert_ok!(context.discard(&added));
    assert_ok!(context.discard(&added));
    assert_eq!(repository.backend().call_count(), 0);
}

#[tokio::test]
async fn test_discard_leaves_stored_instance_untouched() {
    let repository = SagaRepository::new(InMemorySagaBackend::<OrderState>::new());
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);

    let mut loaded = context.insert(OrderState::new(order_id, "acme")).await.unwrap();
    loaded.saga_mut().status = "cancelled".to_string();
    assert_ok!(context.discard(&loaded));

    let stored = repository.backend().get(order_id).await.unwrap();
    assert_eq!(stored.status, "submitted");
}

#[tokio::test]
async fn test_load_miss_returns_none_without_writes() {
    let repository = SagaRepository::new(RecordingBackend::default());
    let consume = submit(Uuid::new_v4());

    let loaded = repository.context(&consume).load(Uuid::new_v4()).await.unwrap();
    assert!(loaded.is_none());
    assert_eq!(repository.backend().call_count(), 1);
}

#[tokio::test]
async fn test_forwarded_message_shares_the_instance() {
    let repository = SagaRepository::new(InMemorySagaBackend::<OrderState>::new());
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);
    let inserted = context.insert(OrderState::new(order_id, "acme")).await.unwrap();

    let accepted = consume.forward(OrderAccepted { order_id });
    let mut forwarded = context.create_saga_consume_context(
        &accepted,
        inserted.saga().clone(),
        SagaConsumeContextMode::Load,
    );
    assert_eq!(forwarded.mode(), SagaConsumeContextMode::Load);
    assert_eq!(forwarded.message().order_id, order_id);
    assert_eq!(forwarded.correlation_id(), order_id);

    forwarded.saga_mut().status = "accepted".to_string();
    assert_ok!(context.update(&mut forwarded).await);
    assert_eq!(repository.backend().get(order_id).await.unwrap().status, "accepted");
}

#[tokio::test]
async fn test_insert_or_load_falls_back_to_existing_instance() {
    let repository = SagaRepository::new(InMemorySagaBackend::<OrderState>::new());
    let order_id = Uuid::new_v4();
    let first = submit(order_id);
    let second = submit(order_id);

    let created = repository
        .context(&first)
        .insert_or_load(OrderState::new(order_id, "first"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.mode(), SagaConsumeContextMode::Insert);

    let resumed = repository
        .context(&second)
        .insert_or_load(OrderState::new(order_id, "second"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.mode(), SagaConsumeContextMode::Load);
    assert_eq!(resumed.saga().customer, "first");
}

#[tokio::test]
async fn test_cancelled_message_stops_backend_calls() {
    let repository = SagaRepository::new(RecordingBackend::default());
    let consume = submit(Uuid::new_v4());
    consume.cancellation_token().cancel();
    let context = repository.context(&consume);

    let err = assert_err!(context.load(Uuid::new_v4()).await);
    assert!(matches!(err, SagaError::Cancelled));
    assert!(context.insert(OrderState::new(Uuid::new_v4(), "acme")).await.is_none());
    assert_eq!(repository.backend().call_count(), 0);
}

#[tokio::test]
async fn test_cancellation_interrupts_a_pending_call() {
    let repository = SagaRepository::new(RecordingBackend::slow(Duration::from_secs(30)));
    let token = CancellationToken::new();
    let consume = submit(Uuid::new_v4()).with_cancellation(token.clone());

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });
    let err = repository
        .context(&consume)
        .load(Uuid::new_v4())
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, SagaError::Cancelled));
}

#[tokio::test]
async fn test_operation_timeout_is_a_backend_fault() {
    let repository = SagaRepository::new(RecordingBackend::slow(Duration::from_secs(30)))
        .with_options(SagaRepositoryOptions::new().operation_timeout(Duration::from_millis(20)));
    let consume = submit(Uuid::new_v4());
    let context = repository.context(&consume);

    let err = context.load(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, SagaError::Timeout(_)));
    assert!(err.is_retryable());

    // Insert absorbs the timeout like any other failure.
    assert!(context.insert(OrderState::new(Uuid::new_v4(), "acme")).await.is_none());
}

#[tokio::test]
async fn test_cancelled_file_insert_never_commits_silently() {
    let dir = tempdir().unwrap();
    let backend = FileSagaBackend::<OrderState>::open(FileBackendConfig::new(dir.path()))
        .await
        .unwrap();
    let repository = SagaRepository::new(backend);
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);

    let mut insert = Box::pin(context.insert(OrderState::new(order_id, "acme")));
    let inserted = match futures::poll!(&mut insert) {
        Poll::Ready(inserted) => inserted,
        Poll::Pending => {
            consume.cancellation_token().cancel();
            insert.await
        }
    };

    let committed = repository.backend().document_path(order_id).exists();
    assert_eq!(inserted.is_some(), committed);

    if inserted.is_none() {
        // Nothing was written, so a redelivery still gets to create it.
        let retry = submit(order_id);
        let created = repository
            .context(&retry)
            .insert(OrderState::new(order_id, "acme"))
            .await
            .expect("abandoned insert left the key free");
        assert_eq!(created.mode(), SagaConsumeContextMode::Insert);
    }
}

#[tokio::test]
async fn test_cancelled_file_update_keeps_versions_in_step() {
    let dir = tempdir().unwrap();
    let backend = FileSagaBackend::<OrderState>::open(FileBackendConfig::new(dir.path()))
        .await
        .unwrap();
    let repository = SagaRepository::new(backend);
    let order_id = Uuid::new_v4();
    let setup = submit(order_id);
    assert!(
        repository
            .context(&setup)
            .insert(OrderState::new(order_id, "acme"))
            .await
            .is_some()
    );

    let consume = submit(order_id);
    let context = repository.context(&consume);
    let mut loaded = context.load(order_id).await.unwrap().unwrap();
    loaded.saga_mut().status = "accepted".to_string();

    let outcome = {
        let mut update = Box::pin(context.update(&mut loaded));
        match futures::poll!(&mut update) {
            Poll::Ready(outcome) => outcome,
            Poll::Pending => {
                consume.cancellation_token().cancel();
                update.await
            }
        }
    };

    let reader = submit(order_id);
    let stored = repository
        .context(&reader)
        .load(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.saga().version, stored.saga().version);
    match outcome {
        Ok(()) => assert_eq!(stored.saga().status, "accepted"),
        Err(err) => {
            assert!(matches!(err, SagaError::Cancelled));
            assert_eq!(stored.saga().status, "submitted");
        }
    }
}

/// Finishes every write it starts, whatever the token says.
struct UninterruptibleBackend {
    inner: InMemorySagaBackend<OrderState>,
    delay: Duration,
}

#[async_trait]
impl SagaBackend<OrderState> for UninterruptibleBackend {
    fn name(&self) -> &'static str {
        "uninterruptible"
    }

    async fn insert(&self, instance: &mut OrderState, _: &CancellationToken) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(instance, &CancellationToken::new()).await
    }

    async fn load(&self, id: Uuid, cancel: &CancellationToken) -> Result<Option<OrderState>> {
        self.inner.load(id, cancel).await
    }

    async fn add(&self, instance: &mut OrderState, _: &CancellationToken) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.add(instance, &CancellationToken::new()).await
    }

    async fn update(&self, instance: &mut OrderState, _: &CancellationToken) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.update(instance, &CancellationToken::new()).await
    }

    async fn delete(&self, instance: &OrderState, _: &CancellationToken) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete(instance, &CancellationToken::new()).await
    }
}

#[tokio::test]
async fn test_committed_write_is_reported_after_timeout() {
    let repository = SagaRepository::new(UninterruptibleBackend {
        inner: InMemorySagaBackend::new(),
        delay: Duration::from_millis(50),
    })
    .with_options(SagaRepositoryOptions::new().operation_timeout(Duration::from_millis(5)));
    let order_id = Uuid::new_v4();
    let consume = submit(order_id);
    let context = repository.context(&consume);

    let mut inserted = context
        .insert(OrderState::new(order_id, "acme"))
        .await
        .expect("the write completed, so the insert succeeded");
    assert_eq!(inserted.saga().version, 1);

    inserted.saga_mut().status = "accepted".to_string();
    assert_ok!(context.update(&mut inserted).await);
    assert_eq!(inserted.saga().version, 2);
    assert_eq!(repository.backend().inner.get(order_id).await.unwrap().version, 2);
}

#[tokio::test]
async fn test_slow_write_stopped_by_timeout_reports_timeout() {
    let repository = SagaRepository::new(RecordingBackend::slow(Duration::from_secs(30)))
        .with_options(SagaRepositoryOptions::new().operation_timeout(Duration::from_millis(20)));
    let consume = submit(Uuid::new_v4());
    let context = repository.context(&consume);

    let mut added = context.add(OrderState::new(Uuid::new_v4(), "acme"));
    let err = context.save(&mut added).await.unwrap_err();
    assert!(matches!(err, SagaError::Timeout(_)));
    assert!(!consume.is_cancelled());
}
