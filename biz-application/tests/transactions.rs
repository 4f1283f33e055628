use biz_application::error::AppError;
use biz_application::transaction::{
    InMemoryStore, InMemoryTransaction, IsolationLevel, RetryPolicy, StoreTransactionManager,
    TransactionManager,
};
use biz_application::AppContext;
use futures_util::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn manager(store: &Arc<InMemoryStore>, retry: RetryPolicy) -> StoreTransactionManager<InMemoryStore> {
    StoreTransactionManager::new(store.clone()).with_retry_policy(retry)
}

#[tokio::test]
async fn successful_action_commits_staged_writes() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::none()).with_isolation(IsolationLevel::Serializable);
    let ctx = AppContext::default();

    let isolation = manager
        .execute_in_transaction(&ctx, |tx_ctx| {
            Box::pin(async move {
                let tx = tx_ctx.transaction_handle::<InMemoryTransaction>()?;
                tx.put("service:1", json!({"name": "Haircut"}))?;
                Ok(tx_ctx.transaction().map(|t| t.isolation()))
            })
        })
        .await
        .unwrap();

    assert_eq!(isolation, Some(IsolationLevel::Serializable));
    assert_eq!(store.get("service:1"), Some(json!({"name": "Haircut"})));
    assert_eq!((store.begun(), store.committed(), store.rolled_back()), (1, 1, 0));
    assert!(ctx.transaction().is_none());
}

#[tokio::test]
async fn fault_rolls_back_every_partial_write() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::immediate(3));
    let ctx = AppContext::default();

    let err = manager
        .execute_in_transaction(&ctx, |tx_ctx| {
            Box::pin(async move {
                let tx = tx_ctx.transaction_handle::<InMemoryTransaction>()?;
                tx.put("service:1", json!("first step"))?;
                tx.put("service:2", json!("second step"))?;
                Err::<(), _>(AppError::database("unique violation"))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Database { transient: false, .. }));
    assert!(store.is_empty());
    assert_eq!((store.begun(), store.committed(), store.rolled_back()), (1, 0, 1));
}

#[tokio::test]
async fn nested_calls_join_the_active_transaction() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::none());
    let manager_ref = &manager;
    let ctx = AppContext::default();

    let (outer_id, inner_id) = manager
        .execute_in_transaction(&ctx, move |tx_ctx| {
            Box::pin(async move {
                let outer_id = tx_ctx.transaction().map(|t| t.id());
                let inner_id = manager_ref
                    .execute_in_transaction(&tx_ctx, |inner_ctx| {
                        Box::pin(async move {
                            inner_ctx
                                .transaction_handle::<InMemoryTransaction>()?
                                .put("inner", json!(true))?;
                            Ok(inner_ctx.transaction().map(|t| t.id()))
                        })
                    })
                    .await?;
                Ok((outer_id, inner_id))
            })
        })
        .await
        .unwrap();

    assert!(outer_id.is_some());
    assert_eq!(outer_id, inner_id);
    assert_eq!(store.get("inner"), Some(json!(true)));
    assert_eq!((store.begun(), store.committed()), (1, 1));
}

#[tokio::test]
async fn transient_faults_are_retried_with_a_fresh_transaction() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_next_commits(2);
    let manager = manager(&store, RetryPolicy::immediate(3));
    let ctx = AppContext::default();
    let attempts = AtomicUsize::new(0);
    let attempts_ref = &attempts;

    manager
        .execute_in_transaction(&ctx, move |tx_ctx| {
            Box::pin(async move {
                attempts_ref.fetch_add(1, Ordering::SeqCst);
                let tx = tx_ctx.transaction_handle::<InMemoryTransaction>()?;
                let visits = tx.get("visits").and_then(|v| v.as_i64()).unwrap_or(0);
                tx.put("visits", json!(visits + 1))
            })
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(store.get("visits"), Some(json!(1)));
    assert_eq!((store.begun(), store.committed(), store.rolled_back()), (3, 1, 2));
}

#[tokio::test]
async fn retries_stop_after_the_policy_limit() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_next_commits(10);
    let manager = manager(&store, RetryPolicy::immediate(2));
    let ctx = AppContext::default();
    let attempts = AtomicUsize::new(0);
    let attempts_ref = &attempts;

    let err = manager
        .execute_in_transaction(&ctx, move |_| {
            Box::pin(async move {
                attempts_ref.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(err.is_transient());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(store.committed(), 0);
}

#[tokio::test]
async fn permanent_faults_are_not_retried() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::immediate(5));
    let ctx = AppContext::default();
    let attempts = AtomicUsize::new(0);
    let attempts_ref = &attempts;

    let err = manager
        .execute_in_transaction(&ctx, move |_| {
            Box::pin(async move {
                attempts_ref.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(AppError::Infra("disk full".into()))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Infra(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_waits_between_attempts() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_next_commits(2);
    let manager = manager(
        &store,
        RetryPolicy {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            jitter: false,
        },
    );
    let ctx = AppContext::default();

    let started = tokio::time::Instant::now();
    manager
        .execute_in_transaction(&ctx, |_| Box::pin(async { Ok(()) }))
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    assert_eq!(store.committed(), 1);
}

#[tokio::test]
async fn cancellation_during_action_rolls_back() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::immediate(3));
    let ctx = AppContext::default();
    let token = ctx.cancellation().clone();

    let err = manager
        .execute_in_transaction(&ctx, move |tx_ctx| {
            let token = token.clone();
            Box::pin(async move {
                tx_ctx
                    .transaction_handle::<InMemoryTransaction>()?
                    .put("service:1", json!("never committed"))?;
                token.cancel();
                std::future::pending::<Result<(), AppError>>().await
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert!(store.is_empty());
    assert_eq!((store.begun(), store.committed(), store.rolled_back()), (1, 0, 1));
}

#[tokio::test]
async fn action_that_finishes_after_cancellation_is_not_committed() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::none());
    let ctx = AppContext::default();
    let token = ctx.cancellation().clone();

    let err = manager
        .execute_in_transaction(&ctx, move |tx_ctx| {
            let token = token.clone();
            Box::pin(async move {
                tx_ctx
                    .transaction_handle::<InMemoryTransaction>()?
                    .put("service:1", json!("late"))?;
                token.cancel();
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!((store.committed(), store.rolled_back()), (0, 1));
}

#[tokio::test]
async fn cancelled_context_never_begins_a_transaction() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::none());
    let ctx = AppContext::default();
    ctx.cancellation().cancel();

    let err = manager
        .execute_in_transaction(&ctx, |_| Box::pin(async { Ok(()) }))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Cancelled));
    assert_eq!(store.begun(), 0);
}

#[tokio::test]
async fn panicking_action_rolls_back_before_unwinding() {
    let store = Arc::new(InMemoryStore::new());
    let manager = manager(&store, RetryPolicy::immediate(3));
    let ctx = AppContext::default();

    let outcome = AssertUnwindSafe(manager.execute_in_transaction(&ctx, |tx_ctx| {
        Box::pin(async move {
            tx_ctx
                .transaction_handle::<InMemoryTransaction>()?
                .put("service:1", json!("half written"))?;
            if tx_ctx.transaction().is_some() {
                panic!("handler bug");
            }
            Ok::<(), AppError>(())
        })
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    assert!(store.is_empty());
    assert_eq!((store.begun(), store.committed(), store.rolled_back()), (1, 0, 1));
}
