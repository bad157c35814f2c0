use crate::{command::Command, context::AppContext, error::AppError};
use async_trait::async_trait;

/// 命令处理器：每种命令类型在总线上至多绑定一个
///
/// 返回的错误由总线原样交给调用方，不做转换或重试。
#[async_trait]
pub trait CommandHandler<C>: Send + Sync
where
    C: Command,
{
    async fn handle(&self, ctx: &AppContext, cmd: C) -> Result<(), AppError>;
}
