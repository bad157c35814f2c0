//! 查询结果缓存
//!
//! - `Cache`：带可选过期时间的键值缓存接口，键统一加前缀（`{prefix}:{key}`）；
//! - `InMemoryCache`：基于 `DashMap` 的进程内实现，过期项在读取时惰性淘汰；
//! - `CachedQueryHandler`：包装任意 `QueryHandler`，按键策略命中缓存，
//!   未命中时调用内部处理器并写回。处理器错误从不缓存。
//!
use crate::{context::AppContext, error::AppError, query::Query, query_handler::QueryHandler};
use async_trait::async_trait;
use bon::Builder;
use dashmap::DashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_CACHE_PREFIX: &str = "cache";

#[async_trait]
pub trait Cache<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, AppError>;

    /// 写入；`ttl` 为空表示永不过期
    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<(), AppError>;

    async fn delete(&self, key: &str) -> Result<(), AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

pub struct InMemoryCache<V> {
    prefix: String,
    entries: DashMap<String, Entry<V>>,
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::with_prefix(DEFAULT_CACHE_PREFIX)
    }
}

impl<V> InMemoryCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: DashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 当前存量（含尚未被淘汰的过期项）
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl<V> Cache<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Result<Option<V>, AppError> {
        let key = self.build_key(key);
        let now = Instant::now();

        let expired = match self.entries.get(&key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(&key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: V, ttl: Option<Duration>) -> Result<(), AppError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .insert(self.build_key(key), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.entries.remove(&self.build_key(key));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(&self.build_key(key))
            .is_some_and(|entry| !entry.is_expired(now)))
    }
}

/// 带缓存的查询处理器
///
/// ```rust,ignore
/// let handler: CachedQueryHandler<GetBalance, _, _, _> = CachedQueryHandler::builder()
///     .inner(GetBalanceHandler::new(repo))
///     .cache(Arc::new(InMemoryCache::new()))
///     .key(|q: &GetBalance| format!("balance:{}", q.account_id))
///     .ttl(Duration::from_secs(30))
///     .build();
/// query_bus.register::<GetBalance, _>(Arc::new(handler))?;
/// ```
#[derive(Builder)]
pub struct CachedQueryHandler<Q, H, C, K> {
    inner: H,
    cache: Arc<C>,
    key: K,
    ttl: Option<Duration>,
    #[builder(skip)]
    _query: PhantomData<fn(Q)>,
}

#[async_trait]
impl<Q, H, C, K> QueryHandler<Q> for CachedQueryHandler<Q, H, C, K>
where
    Q: Query,
    Q::Response: Clone,
    H: QueryHandler<Q>,
    C: Cache<Q::Response>,
    K: Fn(&Q) -> String + Send + Sync,
{
    async fn handle(&self, ctx: &AppContext, q: Q) -> Result<Q::Response, AppError> {
        let key = (self.key)(&q);

        // 缓存不可用时降级为直接查询
        match self.cache.get(&key).await {
            Ok(Some(hit)) => {
                tracing::trace!(query = Q::NAME, %key, "cache hit");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(query = Q::NAME, %key, error = %err, "cache read failed"),
        }

        let resp = self.inner.handle(ctx, q).await?;
        if let Err(err) = self.cache.set(&key, resp.clone(), self.ttl).await {
            tracing::warn!(query = Q::NAME, %key, error = %err, "cache write failed");
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::Response;
    use serde::Serialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct GetBalance {
        account_id: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Balance(u64);

    impl Response for Balance {}

    impl Query for GetBalance {
        const NAME: &'static str = "GetBalance";
        type Response = Balance;
    }

    struct BalanceHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl QueryHandler<GetBalance> for BalanceHandler {
        async fn handle(&self, _ctx: &AppContext, q: GetBalance) -> Result<Balance, AppError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as u64;
            if q.account_id == "missing" {
                return Err(AppError::AggregateNotFound(q.account_id));
            }
            Ok(Balance(100 + n))
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl Cache<Balance> for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<Balance>, AppError> {
            Err(AppError::Infra("cache unreachable".into()))
        }
        async fn set(&self, _key: &str, _v: Balance, _ttl: Option<Duration>) -> Result<(), AppError> {
            Err(AppError::Infra("cache unreachable".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), AppError> {
            Ok(())
        }
        async fn exists(&self, _key: &str) -> Result<bool, AppError> {
            Ok(false)
        }
    }

    fn get(id: &str) -> GetBalance {
        GetBalance {
            account_id: id.into(),
        }
    }

    #[tokio::test]
    async fn in_memory_cache_prefixes_and_expires() {
        let cache = InMemoryCache::<u32>::with_prefix("balances");
        cache.set("a", 1, None).await.unwrap();
        cache.set("b", 2, Some(Duration::from_millis(20))).await.unwrap();

        assert_eq!(cache.prefix(), "balances");
        assert!(cache.entries.contains_key("balances:a"));
        assert_eq!(cache.get("a").await.unwrap(), Some(1));
        assert!(cache.exists("b").await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!cache.exists("b").await.unwrap());
        assert_eq!(cache.get("b").await.unwrap(), None);
        assert_eq!(cache.len(), 1);

        cache.delete("a").await.unwrap();
        assert!(cache.is_empty());
        assert_eq!(InMemoryCache::<u32>::new().prefix(), DEFAULT_CACHE_PREFIX);
    }

    #[tokio::test]
    async fn second_query_is_served_from_cache() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: CachedQueryHandler<GetBalance, _, _, _> = CachedQueryHandler::builder()
            .inner(BalanceHandler {
                calls: calls.clone(),
            })
            .cache(Arc::new(InMemoryCache::<Balance>::new()))
            .key(|q: &GetBalance| format!("balance:{}", q.account_id))
            .build();

        let ctx = AppContext::default();
        assert_eq!(handler.handle(&ctx, get("acc-1")).await.unwrap(), Balance(100));
        assert_eq!(handler.handle(&ctx, get("acc-1")).await.unwrap(), Balance(100));
        assert_eq!(handler.handle(&ctx, get("acc-2")).await.unwrap(), Balance(101));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_entry_invokes_inner_handler_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: CachedQueryHandler<GetBalance, _, _, _> = CachedQueryHandler::builder()
            .inner(BalanceHandler {
                calls: calls.clone(),
            })
            .cache(Arc::new(InMemoryCache::<Balance>::new()))
            .key(|q: &GetBalance| q.account_id.clone())
            .ttl(Duration::from_millis(20))
            .build();

        let ctx = AppContext::default();
        handler.handle(&ctx, get("acc-1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(handler.handle(&ctx, get("acc-1")).await.unwrap(), Balance(101));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn errors_are_never_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = Arc::new(InMemoryCache::<Balance>::new());
        let handler: CachedQueryHandler<GetBalance, _, _, _> = CachedQueryHandler::builder()
            .inner(BalanceHandler {
                calls: calls.clone(),
            })
            .cache(cache.clone())
            .key(|q: &GetBalance| q.account_id.clone())
            .build();

        let ctx = AppContext::default();
        assert!(handler.handle(&ctx, get("missing")).await.is_err());
        assert!(handler.handle(&ctx, get("missing")).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn unavailable_cache_falls_back_to_inner_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler: CachedQueryHandler<GetBalance, _, _, _> = CachedQueryHandler::builder()
            .inner(BalanceHandler {
                calls: calls.clone(),
            })
            .cache(Arc::new(BrokenCache))
            .key(|q: &GetBalance| q.account_id.clone())
            .build();

        let ctx = AppContext::default();
        assert_eq!(handler.handle(&ctx, get("acc-1")).await.unwrap(), Balance(100));
        assert_eq!(handler.handle(&ctx, get("acc-1")).await.unwrap(), Balance(101));
    }
}
