use super::{Next, PipelineBehavior, PipelineResult, RequestInfo, RequestKind};
use crate::context::AppContext;
use crate::transaction::TransactionManager;
use async_trait::async_trait;
use std::sync::Arc;

/// 事务行为
///
/// 仅作用于命令；查询只读，直接放行。
/// 剩余链路返回业务失败时事务仍会提交，只有故障触发回滚。
///
/// 注意：多步骤命令在中途返回业务失败时，之前步骤的写入会被提交。
pub struct TransactionBehavior<M> {
    manager: Arc<M>,
}

impl<M> TransactionBehavior<M> {
    pub fn new(manager: Arc<M>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl<M> PipelineBehavior for TransactionBehavior<M>
where
    M: TransactionManager + 'static,
{
    fn name(&self) -> &'static str {
        "transaction"
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        ctx: &AppContext,
        next: Next<'_>,
    ) -> PipelineResult {
        if request.kind() == RequestKind::Query {
            return next.run(ctx).await;
        }

        self.manager
            .execute_in_transaction(ctx, move |tx_ctx| {
                Box::pin(async move { next.run(&tx_ctx).await })
            })
            .await
    }
}
