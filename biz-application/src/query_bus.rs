use crate::{context::AppContext, error::AppResult, query::Query};
use async_trait::async_trait;

/// 查询总线（Query Bus）
///
/// - 负责根据查询的具体类型路由到对应的处理器；
/// - 查询跳过事务行为，其余行为与命令一致；
/// - 对外返回与查询关联的 DTO 类型。
#[async_trait]
pub trait QueryBus: Send + Sync {
    /// 分发查询到对应处理器，返回该查询的 DTO
    async fn query<Q>(&self, ctx: &AppContext, q: Q) -> AppResult<Q::Dto>
    where
        Q: Query;
}
