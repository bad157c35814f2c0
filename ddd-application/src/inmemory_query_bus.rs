use crate::{
    context::AppContext, error::AppError, query::Query, query_bus::QueryBus,
    query_handler::QueryHandler,
};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxAnySend = Box<dyn Any + Send>;

type QueryHandlerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<BoxAnySend, AppError>> + Send + 'a>>;

type QueryHandlerFn =
    Arc<dyn for<'a> Fn(BoxAnySend, &'a AppContext) -> QueryHandlerFuture<'a> + Send + Sync>;

/// 基于内存的 QueryBus 实现
/// - 每个 Query 类型（TypeId）至多绑定一个 Handler，响应类型由 `Query::Response` 唯一确定
/// - 以类型擦除方式调度，并在调用端还原为 `Q::Response`
pub struct InMemoryQueryBus {
    handlers: DashMap<TypeId, (&'static str, QueryHandlerFn)>,
}

impl Default for InMemoryQueryBus {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
        }
    }
}

impl InMemoryQueryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册查询处理器；同一查询重复注册返回 `AlreadyRegisteredQuery`
    pub fn register<Q, H>(&self, handler: Arc<H>) -> Result<(), AppError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        self.insert::<Q>(Self::shared::<Q, H>(handler))
    }

    /// 注册处理器工厂：每次查询时构造新的处理器实例
    pub fn register_factory<Q, H, F>(&self, factory: F) -> Result<(), AppError>
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let f: QueryHandlerFn = Arc::new(move |boxed_q, ctx| {
            let handler = factory();

            Box::pin(async move {
                let q = Self::downcast_query::<Q>(boxed_q)?;
                let resp = handler.handle(ctx, q).await?;
                Ok(Box::new(resp) as BoxAnySend)
            })
        });

        self.insert::<Q>(f)
    }

    /// 显式覆盖已有绑定，返回是否替换了旧的处理器
    pub fn register_override<Q, H>(&self, handler: Arc<H>) -> bool
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        let replaced = self
            .handlers
            .insert(TypeId::of::<Q>(), (Q::NAME, Self::shared::<Q, H>(handler)))
            .is_some();
        if replaced {
            tracing::warn!(query = Q::NAME, "query handler overridden");
        }
        replaced
    }

    /// 获取已注册的查询名列表（只读视图）
    pub fn registered_queries(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|e| e.value().0).collect()
    }

    fn shared<Q, H>(handler: Arc<H>) -> QueryHandlerFn
    where
        Q: Query,
        H: QueryHandler<Q> + 'static,
    {
        Arc::new(move |boxed_q, ctx| {
            let handler = handler.clone();

            Box::pin(async move {
                let q = Self::downcast_query::<Q>(boxed_q)?;
                let resp = handler.handle(ctx, q).await?;
                Ok(Box::new(resp) as BoxAnySend)
            })
        })
    }

    fn downcast_query<Q: Query>(boxed_q: BoxAnySend) -> Result<Q, AppError> {
        boxed_q
            .downcast::<Q>()
            .map(|q| *q)
            .map_err(|_| AppError::TypeMismatch {
                expected: Q::NAME,
                found: "unknown",
            })
    }

    fn insert<Q: Query>(&self, f: QueryHandlerFn) -> Result<(), AppError> {
        match self.handlers.entry(TypeId::of::<Q>()) {
            Entry::Occupied(_) => Err(AppError::AlreadyRegisteredQuery { query: Q::NAME }),
            Entry::Vacant(slot) => {
                slot.insert((Q::NAME, f));
                Ok(())
            }
        }
    }
}

#[async_trait]
impl QueryBus for InMemoryQueryBus {
    #[tracing::instrument(
        skip_all,
        fields(query = Q::NAME, correlation_id = ctx.correlation_id())
    )]
    async fn ask<Q: Query>(&self, ctx: &AppContext, q: Q) -> Result<Q::Response, AppError> {
        let Some(f) = self.handlers.get(&TypeId::of::<Q>()).map(|h| h.1.clone()) else {
            tracing::error!(query = Q::NAME, "no handler registered");
            return Err(AppError::HandlerNotFound(Q::NAME));
        };

        let out = (f)(Box::new(q), ctx).await?;

        out.downcast::<Q::Response>()
            .map(|resp| *resp)
            .map_err(|_| AppError::TypeMismatch {
                expected: std::any::type_name::<Q::Response>(),
                found: "unknown",
            })
    }
}
