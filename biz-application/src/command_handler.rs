use crate::{command::Command, context::AppContext, error::AppResult};
use async_trait::async_trait;

/// 命令处理器
///
/// 命令以引用传入：事务遇到瞬时故障重试时，同一命令会被再次处理。
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &AppContext, cmd: &C) -> AppResult<C::Output>;
}
