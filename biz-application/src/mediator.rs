//! 中介者（Mediator）
//!
//! 按请求的具体类型路由到唯一处理器，并让每次分发穿过同一条管道：
//! - 处理器表与管道在启动时一次性构建，构建后只读；
//! - 同一类型重复注册、管道依赖的类型缺少处理器，都在构建阶段报错；
//! - 运行时分发未注册的类型返回 [`AppError::HandlerNotFound`]。
//!
use crate::command::Command;
use crate::command_bus::CommandBus;
use crate::command_handler::CommandHandler;
use crate::context::AppContext;
use crate::error::{AppError, AppResult};
use crate::pipeline::{
    ErasedHandler, ErasedValue, Next, PipelineBehavior, PipelineResult, RequestInfo, RequestKind,
};
use crate::query::Query;
use crate::query_bus::QueryBus;
use crate::query_handler::QueryHandler;
use async_trait::async_trait;
use biz_domain::BizResult;
use futures_util::future::BoxFuture;
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

struct Registration {
    name: &'static str,
    kind: RequestKind,
    handler: ErasedHandler,
}

fn erase<F>(f: F) -> ErasedHandler
where
    F: for<'a> Fn(&'a (dyn Any + Send + Sync), &'a AppContext) -> BoxFuture<'a, PipelineResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// 中介者构建器
///
/// ```rust,ignore
/// let mediator = Mediator::builder()
///     .command::<CreateService, _>(Arc::new(CreateServiceHandler::new(store.clone())))?
///     .query::<GetService, _>(Arc::new(GetServiceHandler::new(store.clone())))?
///     .behaviors(Pipeline::standard(&config, validators, manager))
///     .build()?;
/// ```
#[derive(Default)]
pub struct MediatorBuilder {
    handlers: HashMap<TypeId, Registration>,
    behaviors: Vec<Arc<dyn PipelineBehavior>>,
    required: Vec<(TypeId, &'static str)>,
}

impl MediatorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册命令处理器；同一命令类型只能注册一次
    pub fn command<C, H>(mut self, handler: Arc<H>) -> Result<Self, AppError>
    where
        C: Command,
        H: CommandHandler<C> + 'static,
    {
        let key = TypeId::of::<C>();
        if self.handlers.contains_key(&key) {
            return Err(AppError::AlreadyRegisteredCommand { command: C::NAME });
        }

        let f = erase(move |payload, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                // 键与闭包来自同一泛型 C，正常情况下 downcast 不会失败
                let Some(cmd) = payload.downcast_ref::<C>() else {
                    return Err(AppError::TypeMismatch {
                        expected: C::NAME,
                        found: "unknown",
                    });
                };

                let outcome = handler.handle(ctx, cmd).await?;
                Ok(outcome.map(|value| Box::new(value) as ErasedValue))
            })
        });

        self.handlers.insert(
            key,
            Registration {
                name: C::NAME,
                kind: RequestKind::Command,
                handler: f,
            },
        );
        Ok(self)
    }

    /// 注册查询处理器；同一查询类型只能注册一次
    pub fn query<Q, H>(mut self, handler: Arc<H>) -> Result<Self, AppError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let key = TypeId::of::<Q>();
        if self.handlers.contains_key(&key) {
            return Err(AppError::AlreadyRegisteredQuery { query: Q::NAME });
        }

        let f = erase(move |payload, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                let Some(q) = payload.downcast_ref::<Q>() else {
                    return Err(AppError::TypeMismatch {
                        expected: Q::NAME,
                        found: "unknown",
                    });
                };

                let outcome = handler.handle(ctx, q).await?;
                Ok(outcome.map(|dto| Box::new(dto) as ErasedValue))
            })
        });

        self.handlers.insert(
            key,
            Registration {
                name: Q::NAME,
                kind: RequestKind::Query,
                handler: f,
            },
        );
        Ok(self)
    }

    /// 追加一个管道行为（外层先注册）
    pub fn behavior<B>(mut self, behavior: B) -> Self
    where
        B: PipelineBehavior + 'static,
    {
        self.behaviors.push(Arc::new(behavior));
        self
    }

    pub fn behaviors<I>(mut self, behaviors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn PipelineBehavior>>,
    {
        self.behaviors.extend(behaviors);
        self
    }

    /// 声明必须存在处理器的请求类型，构建时检查
    pub fn require<R: Any>(mut self) -> Self {
        self.required.push((TypeId::of::<R>(), type_name::<R>()));
        self
    }

    pub fn build(self) -> Result<Mediator, AppError> {
        let behavior_requirements = self.behaviors.iter().flat_map(|behavior| {
            behavior
                .required_request_types()
                .into_iter()
                .map(move |(id, name)| (behavior.name(), id, name))
        });

        for (owner, id, name) in self
            .required
            .iter()
            .map(|(id, name)| ("mediator", *id, *name))
            .chain(behavior_requirements)
        {
            if !self.handlers.contains_key(&id) {
                return Err(AppError::Config(format!(
                    "{owner} requires a handler for {name}, but none is registered"
                )));
            }
        }

        debug!(
            handlers = self.handlers.len(),
            behaviors = self.behaviors.len(),
            "mediator built"
        );

        Ok(Mediator {
            handlers: self.handlers,
            behaviors: self.behaviors,
        })
    }
}

/// 进程内中介者，同时实现 [`CommandBus`] 与 [`QueryBus`]
pub struct Mediator {
    handlers: HashMap<TypeId, Registration>,
    behaviors: Vec<Arc<dyn PipelineBehavior>>,
}

impl Mediator {
    pub fn builder() -> MediatorBuilder {
        MediatorBuilder::new()
    }

    /// 已注册的请求（名称与类别）
    pub fn registered_requests(&self) -> impl Iterator<Item = (&'static str, RequestKind)> + '_ {
        self.handlers.values().map(|r| (r.name, r.kind))
    }

    pub fn contains<R: Any>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<R>())
    }

    pub fn behavior_names(&self) -> Vec<&'static str> {
        self.behaviors.iter().map(|b| b.name()).collect()
    }

    async fn dispatch_erased(
        &self,
        ctx: &AppContext,
        name: &'static str,
        type_id: TypeId,
        payload: &(dyn Any + Send + Sync),
    ) -> PipelineResult {
        let Some(registration) = self.handlers.get(&type_id) else {
            warn!(request = name, "no handler registered");
            return Err(AppError::HandlerNotFound(name));
        };

        ctx.ensure_active()?;

        let request = RequestInfo::new(registration.name, registration.kind, type_id, payload);
        Next::new(request, &self.behaviors, &registration.handler)
            .run(ctx)
            .await
    }
}

fn downcast_outcome<T: Any>(outcome: BizResult<ErasedValue>) -> AppResult<T> {
    match outcome.into_result() {
        Ok(value) => match value.downcast::<T>() {
            Ok(value) => Ok(BizResult::success(*value)),
            Err(_) => Err(AppError::TypeMismatch {
                expected: type_name::<T>(),
                found: "unknown",
            }),
        },
        Err(err) => Ok(BizResult::failure(err)),
    }
}

#[async_trait]
impl CommandBus for Mediator {
    async fn send<C>(&self, ctx: &AppContext, cmd: C) -> AppResult<C::Output>
    where
        C: Command,
    {
        let outcome = self
            .dispatch_erased(ctx, C::NAME, TypeId::of::<C>(), &cmd)
            .await?;
        downcast_outcome::<C::Output>(outcome)
    }
}

#[async_trait]
impl QueryBus for Mediator {
    async fn query<Q>(&self, ctx: &AppContext, q: Q) -> AppResult<Q::Dto>
    where
        Q: Query,
    {
        let outcome = self
            .dispatch_erased(ctx, Q::NAME, TypeId::of::<Q>(), &q)
            .await?;
        downcast_outcome::<Q::Dto>(outcome)
    }
}
