use biz_domain::BizResult;

/// 处理器与总线的返回类型
///
/// 外层 `Result` 承载故障（配置错误、基础设施异常、取消等），
/// 内层 [`BizResult`] 承载预期内的业务成功/失败。两条通道不可混用：
/// 事务只在故障时回滚，业务失败照常提交。
pub type AppResult<T> = Result<BizResult<T>, AppError>;

/// 应用层故障
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("handler not found: {0}")]
    HandlerNotFound(&'static str),

    #[error("handler already registered: command={command}")]
    AlreadyRegisteredCommand { command: &'static str },

    #[error("handler already registered: query={query}")]
    AlreadyRegisteredQuery { query: &'static str },

    #[error("type mismatch: expected={expected}, found={found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("tenant unresolved: {0}")]
    TenantUnresolved(String),

    #[error("database: {reason}")]
    Database { reason: String, transient: bool },

    #[error("infra: {0}")]
    Infra(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("config: {0}")]
    Config(String),
}

impl AppError {
    /// 构造可重试的数据库故障（连接中断、序列化冲突等）
    pub fn transient(reason: impl Into<String>) -> Self {
        AppError::Database {
            reason: reason.into(),
            transient: true,
        }
    }

    pub fn database(reason: impl Into<String>) -> Self {
        AppError::Database {
            reason: reason.into(),
            transient: false,
        }
    }

    /// 是否为瞬时故障，决定事务执行策略是否重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database {
                transient: true,
                ..
            }
        )
    }
}

// ---- Cross-crate conversions for infrastructure convenience ----
// 允许在基础设施层直接使用 `?` 将 sqlx 错误转换为 AppError，并保留瞬时性判断

#[cfg(feature = "infra-sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let transient = crate::transaction::postgres::is_transient(&err);
        AppError::Database {
            reason: err.to_string(),
            transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_database_faults_are_retryable() {
        assert!(AppError::transient("connection reset").is_transient());
        assert!(!AppError::database("unique violation").is_transient());
        assert!(!AppError::Infra("disk full".into()).is_transient());
        assert!(!AppError::Cancelled.is_transient());
    }

    #[test]
    fn display_includes_reason() {
        let err = AppError::HandlerNotFound("Catalog.CreateService");
        assert_eq!(err.to_string(), "handler not found: Catalog.CreateService");
    }
}
