//! Postgres 事务后端（`infra-sqlx` 特性）
//!
//! 处理器通过 `ctx.transaction_handle::<PgTransactionHandle>()` 取得连接，
//! 在同一事务内执行 SQL：
//!
//! ```rust,ignore
//! let handle = ctx.transaction_handle::<PgTransactionHandle>()?;
//! let mut guard = handle.lock().await;
//! let tx = guard.as_mut().ok_or(AppError::InvalidOperation("transaction finished".into()))?;
//! sqlx::query("UPDATE services SET name = $1 WHERE id = $2")
//!     .bind(&cmd.name)
//!     .bind(cmd.id)
//!     .execute(&mut **tx)
//!     .await?;
//! ```
//!
use super::{ActiveTransaction, IsolationLevel, TransactionBackend};
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::any::type_name;
use std::sync::Arc;
use tokio::sync::Mutex;

/// 事务句柄：提交或回滚后内部为 `None`
pub type PgTransactionHandle = Mutex<Option<Transaction<'static, Postgres>>>;

// SQLSTATE：序列化失败、死锁、连接异常、管理员关闭、连接数过多
const TRANSIENT_SQLSTATES: &[&str] = &["40001", "40P01", "57P01", "53300"];

/// 判断 sqlx 错误是否为瞬时故障
pub fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| code.starts_with("08") || TRANSIENT_SQLSTATES.contains(&&*code))
            .unwrap_or(false),
        _ => false,
    }
}

#[derive(Clone)]
pub struct PgTransactionBackend {
    pool: PgPool,
}

impl PgTransactionBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn as_pg_tx(tx: &ActiveTransaction) -> Result<Arc<PgTransactionHandle>, AppError> {
        tx.handle::<PgTransactionHandle>()
            .ok_or(AppError::TypeMismatch {
                expected: type_name::<PgTransactionHandle>(),
                found: "unknown",
            })
    }
}

#[async_trait]
impl TransactionBackend for PgTransactionBackend {
    async fn begin(&self, isolation: IsolationLevel) -> Result<ActiveTransaction, AppError> {
        let mut tx = self.pool.begin().await?;
        let statement = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        sqlx::query(&statement).execute(&mut *tx).await?;

        let handle: Arc<PgTransactionHandle> = Arc::new(Mutex::new(Some(tx)));
        Ok(ActiveTransaction::new(isolation, handle))
    }

    async fn commit(&self, tx: &ActiveTransaction) -> Result<(), AppError> {
        let handle = Self::as_pg_tx(tx)?;
        let inner = handle.lock().await.take();
        match inner {
            Some(pg_tx) => Ok(pg_tx.commit().await?),
            None => Err(AppError::InvalidOperation(
                "transaction has already completed".into(),
            )),
        }
    }

    async fn rollback(&self, tx: &ActiveTransaction) -> Result<(), AppError> {
        let handle = Self::as_pg_tx(tx)?;
        let inner = handle.lock().await.take();
        if let Some(pg_tx) = inner {
            pg_tx.rollback().await?;
        }
        Ok(())
    }
}
