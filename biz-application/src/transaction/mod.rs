//! 事务管理（Transaction Manager）
//!
//! 在数据库事务中执行一个工作单元，并对瞬时故障自动重试：
//! - 重入：上下文已处于事务中时直接执行，不开启嵌套事务；
//! - 正常返回即提交，故障（`Err`）回滚并原样传播；
//! - 业务失败（`BizResult::failure`）属于正常返回，照常提交；
//! - 取消：执行期间收到取消信号时回滚，绝不提交；
//! - panic：工作单元 panic 时先回滚，再继续向上展开。
//!
//! 重试意味着工作单元可能被执行多次，工作单元必须只在事务边界内产生副作用。
//!
mod inmemory;
#[cfg(feature = "infra-sqlx")]
pub mod postgres;
mod retry;

pub use inmemory::{InMemoryStore, InMemoryTransaction};
pub use retry::RetryPolicy;

use crate::config::PipelineConfig;
use crate::context::AppContext;
use crate::error::AppError;
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 工作单元返回的 future
pub type TxFuture<'a, T> = BoxFuture<'a, Result<T, AppError>>;

/// 事务隔离级别
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub const fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            other => Err(AppError::Config(format!("unknown isolation level: {other}"))),
        }
    }
}

/// 一次已开启的事务
///
/// `handle` 为后端自定义的事务句柄（如暂存写入、数据库连接），
/// 处理器通过 [`AppContext::transaction_handle`] 按具体类型取回。
#[derive(Clone)]
pub struct ActiveTransaction {
    id: Uuid,
    isolation: IsolationLevel,
    handle: Arc<dyn Any + Send + Sync>,
}

impl ActiveTransaction {
    pub fn new(isolation: IsolationLevel, handle: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            id: Uuid::new_v4(),
            isolation,
            handle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn handle<H>(&self) -> Option<Arc<H>>
    where
        H: Any + Send + Sync,
    {
        self.handle.clone().downcast::<H>().ok()
    }
}

impl fmt::Debug for ActiveTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveTransaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .finish_non_exhaustive()
    }
}

/// 事务后端：负责真正的开启/提交/回滚
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    async fn begin(&self, isolation: IsolationLevel) -> Result<ActiveTransaction, AppError>;
    async fn commit(&self, tx: &ActiveTransaction) -> Result<(), AppError>;
    async fn rollback(&self, tx: &ActiveTransaction) -> Result<(), AppError>;
}

/// 事务管理器
///
/// `action` 接收携带当前事务的上下文，可能被调用多次（瞬时故障重试）。
/// 该 trait 带有泛型方法，通常以具体实现类型注入使用。
#[async_trait]
pub trait TransactionManager: Send + Sync {
    async fn execute_in_transaction<'a, T, F>(
        &self,
        ctx: &'a AppContext,
        action: F,
    ) -> Result<T, AppError>
    where
        T: Send + 'a,
        F: Fn(AppContext) -> TxFuture<'a, T> + Send + Sync + 'a;
}

/// 无事务语义的管理器：直接执行，不重试、不控制隔离级别
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpTransactionManager;

#[async_trait]
impl TransactionManager for NoOpTransactionManager {
    async fn execute_in_transaction<'a, T, F>(
        &self,
        ctx: &'a AppContext,
        action: F,
    ) -> Result<T, AppError>
    where
        T: Send + 'a,
        F: Fn(AppContext) -> TxFuture<'a, T> + Send + Sync + 'a,
    {
        action(ctx.clone()).await
    }
}

/// 基于 [`TransactionBackend`] 的事务管理器，带瞬时故障重试策略
pub struct StoreTransactionManager<B> {
    backend: Arc<B>,
    isolation: IsolationLevel,
    retry: RetryPolicy,
}

impl<B> Clone for StoreTransactionManager<B> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            isolation: self.isolation,
            retry: self.retry.clone(),
        }
    }
}

impl<B> StoreTransactionManager<B>
where
    B: TransactionBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            isolation: IsolationLevel::default(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(backend: Arc<B>, config: &PipelineConfig) -> Self {
        Self {
            backend,
            isolation: config.isolation_level,
            retry: config.retry.clone(),
        }
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// 单次尝试：开启 → 执行 → 提交；故障、取消或 panic 时回滚
    async fn run_once<'a, T, F>(&self, ctx: &'a AppContext, action: &F) -> Result<T, AppError>
    where
        T: Send + 'a,
        F: Fn(AppContext) -> TxFuture<'a, T> + Send + Sync + 'a,
    {
        let tx = self.backend.begin(self.isolation).await?;
        debug!(tx_id = %tx.id(), isolation = ?tx.isolation(), "transaction started");

        let attempt = AssertUnwindSafe(action(ctx.with_transaction(tx.clone()))).catch_unwind();
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(AppError::Cancelled),
            res = attempt => match res {
                Ok(res) => res,
                Err(panic) => {
                    warn!(tx_id = %tx.id(), "unit of work panicked");
                    self.rollback_quietly(&tx).await;
                    resume_unwind(panic);
                }
            },
        };

        match outcome {
            Ok(value) if !ctx.is_cancelled() => match self.backend.commit(&tx).await {
                Ok(()) => {
                    debug!(tx_id = %tx.id(), "transaction committed");
                    Ok(value)
                }
                Err(err) => {
                    self.rollback_quietly(&tx).await;
                    Err(err)
                }
            },
            Ok(_) => {
                self.rollback_quietly(&tx).await;
                Err(AppError::Cancelled)
            }
            Err(err) => {
                self.rollback_quietly(&tx).await;
                Err(err)
            }
        }
    }

    // 回滚失败只记录，保留原始故障
    async fn rollback_quietly(&self, tx: &ActiveTransaction) {
        match self.backend.rollback(tx).await {
            Ok(()) => debug!(tx_id = %tx.id(), "transaction rolled back"),
            Err(err) => warn!(tx_id = %tx.id(), error = %err, "transaction rollback failed"),
        }
    }
}

#[async_trait]
impl<B> TransactionManager for StoreTransactionManager<B>
where
    B: TransactionBackend + 'static,
{
    async fn execute_in_transaction<'a, T, F>(
        &self,
        ctx: &'a AppContext,
        action: F,
    ) -> Result<T, AppError>
    where
        T: Send + 'a,
        F: Fn(AppContext) -> TxFuture<'a, T> + Send + Sync + 'a,
    {
        if let Some(tx) = ctx.transaction() {
            debug!(tx_id = %tx.id(), "joining active transaction");
            return action(ctx.clone()).await;
        }

        ctx.ensure_active()?;

        let mut attempt: u32 = 0;
        loop {
            match self.run_once(ctx, &action).await {
                Err(err) if err.is_transient() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient fault, retrying transaction"
                    );

                    tokio::select! {
                        biased;
                        _ = ctx.cancellation().cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_parsing() {
        assert_eq!(
            "read committed".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            "SERIALIZABLE".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
        assert!("snapshot".parse::<IsolationLevel>().is_err());
        assert_eq!(IsolationLevel::default().as_sql(), "READ COMMITTED");
    }

    #[tokio::test]
    async fn noop_manager_is_transparent() {
        let ctx = AppContext::default();
        let value = NoOpTransactionManager
            .execute_in_transaction(&ctx, |tx_ctx| {
                Box::pin(async move {
                    assert!(tx_ctx.transaction().is_none());
                    Ok(7)
                })
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn noop_manager_does_not_retry() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ctx = AppContext::default();
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let err = NoOpTransactionManager
            .execute_in_transaction(&ctx, move |_| {
                Box::pin(async move {
                    calls_ref.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(AppError::transient("connection reset"))
                })
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
