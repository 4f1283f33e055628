//! 请求中介核心（biz-application）
//!
//! 入站请求被建模为命令（改变状态）或查询（只读），由 [`Mediator`] 路由到唯一处理器，
//! 并依次穿过日志、校验、事务、性能四个管道行为。
//!
//! ```rust,ignore
//! let store = Arc::new(InMemoryStore::new());
//! let manager = Arc::new(StoreTransactionManager::from_config(store.clone(), &config));
//! let mediator = Mediator::builder()
//!     .command::<CreateService, _>(Arc::new(CreateServiceHandler::new()))?
//!     .behaviors(Pipeline::standard(&config, validators, manager))
//!     .build()?;
//!
//! let outcome = mediator.send(&ctx, CreateService { .. }).await;
//! let response = ApiResponse::from_outcome(&ctx, outcome);
//! ```
//!
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod config;
pub mod context;
pub mod dto;
pub mod error;
pub mod logging;
pub mod mediator;
pub mod pipeline;
pub mod query;
pub mod query_bus;
pub mod query_handler;
pub mod response;
pub mod transaction;
pub mod validator;

pub use config::{ConfigLoader, PipelineConfig};
pub use context::AppContext;
pub use error::{AppError, AppResult};
pub use mediator::{Mediator, MediatorBuilder};
pub use pipeline::Pipeline;
pub use response::ApiResponse;
pub use transaction::{
    InMemoryStore, NoOpTransactionManager, RetryPolicy, StoreTransactionManager,
    TransactionManager,
};
