use super::{ActiveTransaction, IsolationLevel, TransactionBackend};
use crate::error::AppError;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::any::type_name;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// 基于内存的键值存储，实现事务后端
///
/// - 事务内写入先暂存，提交时整体生效，回滚时整体丢弃；
/// - 记录开启/提交/回滚次数，便于观测事务行为；
/// - 可注入若干次瞬时提交故障，用于验证重试策略。
#[derive(Default)]
pub struct InMemoryStore {
    committed: Arc<DashMap<String, Value>>,
    begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    pending_commit_faults: AtomicU32,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取已提交的值
    pub fn get(&self, key: &str) -> Option<Value> {
        self.committed.get(key).map(|v| v.value().clone())
    }

    pub fn len(&self) -> usize {
        self.committed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty()
    }

    pub fn begun(&self) -> usize {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn committed(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rolled_back(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    /// 接下来的 `n` 次提交以瞬时故障失败
    pub fn fail_next_commits(&self, n: u32) {
        self.pending_commit_faults.store(n, Ordering::SeqCst);
    }

    fn take_commit_fault(&self) -> bool {
        self.pending_commit_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn as_memory_tx(tx: &ActiveTransaction) -> Result<Arc<InMemoryTransaction>, AppError> {
        tx.handle::<InMemoryTransaction>()
            .ok_or(AppError::TypeMismatch {
                expected: type_name::<InMemoryTransaction>(),
                found: "unknown",
            })
    }
}

/// 内存事务句柄：处理器通过 `ctx.transaction_handle::<InMemoryTransaction>()` 获取
pub struct InMemoryTransaction {
    committed: Arc<DashMap<String, Value>>,
    staged: Mutex<HashMap<String, Value>>,
    finished: AtomicBool,
}

impl InMemoryTransaction {
    fn staged(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.staged.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 读取：优先本事务暂存的写入，其次为已提交的值
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.staged().get(key) {
            return Some(v.clone());
        }
        self.committed.get(key).map(|v| v.value().clone())
    }

    pub fn put(&self, key: impl Into<String>, value: Value) -> Result<(), AppError> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(AppError::InvalidOperation(
                "transaction has already completed".into(),
            ));
        }
        self.staged().insert(key.into(), value);
        Ok(())
    }

    pub fn staged_len(&self) -> usize {
        self.staged().len()
    }
}

#[async_trait]
impl TransactionBackend for InMemoryStore {
    async fn begin(&self, isolation: IsolationLevel) -> Result<ActiveTransaction, AppError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        let handle = InMemoryTransaction {
            committed: self.committed.clone(),
            staged: Mutex::new(HashMap::new()),
            finished: AtomicBool::new(false),
        };
        Ok(ActiveTransaction::new(isolation, Arc::new(handle)))
    }

    async fn commit(&self, tx: &ActiveTransaction) -> Result<(), AppError> {
        let memory_tx = Self::as_memory_tx(tx)?;

        if self.take_commit_fault() {
            return Err(AppError::transient("injected commit failure"));
        }

        memory_tx.finished.store(true, Ordering::SeqCst);
        for (key, value) in memory_tx.staged().drain() {
            self.committed.insert(key, value);
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self, tx: &ActiveTransaction) -> Result<(), AppError> {
        let memory_tx = Self::as_memory_tx(tx)?;
        memory_tx.finished.store(true, Ordering::SeqCst);
        memory_tx.staged().clear();
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn staged_writes_apply_on_commit() {
        let store = InMemoryStore::new();
        let tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let handle = tx.handle::<InMemoryTransaction>().unwrap();

        handle.put("service:1", json!({"name": "Haircut"})).unwrap();
        assert_eq!(handle.get("service:1"), Some(json!({"name": "Haircut"})));
        assert!(store.get("service:1").is_none());

        store.commit(&tx).await.unwrap();
        assert_eq!(store.get("service:1"), Some(json!({"name": "Haircut"})));
        assert_eq!((store.begun(), store.committed(), store.rolled_back()), (1, 1, 0));
        assert!(handle.put("service:2", json!(null)).is_err());
    }

    #[tokio::test]
    async fn rollback_discards_staged_writes() {
        let store = InMemoryStore::new();
        let tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        tx.handle::<InMemoryTransaction>()
            .unwrap()
            .put("counter", json!(1))
            .unwrap();

        store.rollback(&tx).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.rolled_back(), 1);
    }

    #[tokio::test]
    async fn injected_commit_faults_are_transient() {
        let store = InMemoryStore::new();
        store.fail_next_commits(1);

        let tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let err = store.commit(&tx).await.unwrap_err();
        assert!(err.is_transient());

        let tx = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        store.commit(&tx).await.unwrap();
        assert_eq!(store.committed(), 1);
    }
}
