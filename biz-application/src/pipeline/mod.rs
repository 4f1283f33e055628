//! 管道行为（Pipeline Behaviors）
//!
//! 每次分发都会按注册顺序穿过一组行为，最内层到达处理器：
//! - 进入时按注册顺序（外层在前），退出时严格逆序；
//! - 每个行为通过 [`Next::run`] 调用剩余链路，也可以不调用而直接短路返回；
//! - `Next` 可被多次调用，事务行为在瞬时故障时借此重放剩余链路。
//!
//! 标准顺序见 [`Pipeline::standard`]：日志 → 校验 → 事务 → 性能。
//!
mod logging;
mod performance;
mod transaction;
mod validation;

pub use logging::LoggingBehavior;
pub use performance::PerformanceBehavior;
pub use transaction::TransactionBehavior;
pub use validation::ValidationBehavior;

use crate::config::PipelineConfig;
use crate::context::AppContext;
use crate::error::AppError;
use crate::transaction::TransactionManager;
use crate::validator::Validators;
use async_trait::async_trait;
use biz_domain::BizResult;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// 类型擦除后的成功值
pub type ErasedValue = Box<dyn Any + Send>;

/// 管道内部流转的结果：故障在外层，业务结果在内层
pub type PipelineResult = Result<BizResult<ErasedValue>, AppError>;

pub(crate) type ErasedHandler = Arc<
    dyn for<'a> Fn(&'a (dyn Any + Send + Sync), &'a AppContext) -> BoxFuture<'a, PipelineResult>
        + Send
        + Sync,
>;

/// 请求类别：命令会进入事务，查询不会
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Command,
    Query,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Command => f.write_str("command"),
            RequestKind::Query => f.write_str("query"),
        }
    }
}

/// 行为可见的请求视图
#[derive(Clone, Copy)]
pub struct RequestInfo<'a> {
    name: &'static str,
    kind: RequestKind,
    type_id: TypeId,
    payload: &'a (dyn Any + Send + Sync),
}

impl<'a> RequestInfo<'a> {
    pub(crate) fn new(
        name: &'static str,
        kind: RequestKind,
        type_id: TypeId,
        payload: &'a (dyn Any + Send + Sync),
    ) -> Self {
        Self {
            name,
            kind,
            type_id,
            payload,
        }
    }

    /// 请求的稳定名称（`Command::NAME` / `Query::NAME`）
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn payload(&self) -> &'a (dyn Any + Send + Sync) {
        self.payload
    }

    pub fn downcast_ref<R: Any>(&self) -> Option<&'a R> {
        self.payload.downcast_ref::<R>()
    }
}

impl fmt::Debug for RequestInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInfo")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// 剩余链路的续体
#[derive(Clone, Copy)]
pub struct Next<'a> {
    request: RequestInfo<'a>,
    behaviors: &'a [Arc<dyn PipelineBehavior>],
    handler: &'a ErasedHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        request: RequestInfo<'a>,
        behaviors: &'a [Arc<dyn PipelineBehavior>],
        handler: &'a ErasedHandler,
    ) -> Self {
        Self {
            request,
            behaviors,
            handler,
        }
    }

    /// 执行剩余链路；每一步之前检查取消信号
    pub fn run<'b>(&'b self, ctx: &'b AppContext) -> BoxFuture<'b, PipelineResult>
    where
        'a: 'b,
    {
        Box::pin(async move {
            ctx.ensure_active()?;

            match self.behaviors.split_first() {
                Some((head, rest)) => {
                    let next = Next {
                        behaviors: rest,
                        ..*self
                    };
                    head.handle(&self.request, ctx, next).await
                }
                None => (self.handler)(self.request.payload, ctx).await,
            }
        })
    }
}

/// 管道行为
#[async_trait]
pub trait PipelineBehavior: Send + Sync {
    /// 行为名称（用于日志与诊断）
    fn name(&self) -> &'static str;

    /// 该行为依赖的请求类型（启动时校验处理器表是否完整）
    fn required_request_types(&self) -> Vec<(TypeId, &'static str)> {
        Vec::new()
    }

    async fn handle(
        &self,
        request: &RequestInfo<'_>,
        ctx: &AppContext,
        next: Next<'_>,
    ) -> PipelineResult;
}

/// 标准管道
pub struct Pipeline;

impl Pipeline {
    /// 按固定顺序组装：日志 → 校验 → 事务 → 性能
    ///
    /// 日志观察包括事务结果在内的最终结果；校验先于任何事务开启；
    /// 事务包裹处理器而不包裹校验。
    pub fn standard<M>(
        config: &PipelineConfig,
        validators: Validators,
        manager: Arc<M>,
    ) -> Vec<Arc<dyn PipelineBehavior>>
    where
        M: TransactionManager + 'static,
    {
        vec![
            Arc::new(LoggingBehavior::new()),
            Arc::new(ValidationBehavior::new(validators)),
            Arc::new(TransactionBehavior::new(manager)),
            Arc::new(PerformanceBehavior::new(config.slow_request_threshold)),
        ]
    }
}
