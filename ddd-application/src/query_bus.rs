use crate::{context::AppContext, error::AppError, query::Query};
use async_trait::async_trait;

/// 查询总线（Query Bus）
///
/// - 负责根据查询的具体类型路由到唯一的处理器；
/// - 对外返回与查询关联的响应类型；
/// - 未注册的查询返回 `AppError::HandlerNotFound`，处理器错误原样返回。
#[async_trait]
pub trait QueryBus: Send + Sync {
    /// 分发查询到对应处理器，返回该查询的响应
    async fn ask<Q: Query>(&self, ctx: &AppContext, q: Q) -> Result<Q::Response, AppError>;
}
