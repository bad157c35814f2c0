//! 事务边界（Unit of Work / TransactionManager）
//!
//! 将一段业务操作包裹在事务内，并在提交成功之后再发布领域事件：
//!
//! ```text
//! Idle -> Begun -> (Committed | RolledBack) -> CleanedUp
//! ```
//!
//! - 业务操作或提交失败：回滚，丢弃全部待发布事件（不会部分泄漏）；
//! - 提交成功后发布失败：业务状态已提交、不会撤销，错误仍返回给调用方；
//! - `cleanup` 在每条退出路径上恰好执行一次。
//!
use crate::error::{AppError, TransactionStage};
use async_trait::async_trait;
use ddd_domain::aggregate::AggregateRoot;
use ddd_domain::domain_event::{DomainEvent, SharedEvent};
use ddd_domain::eventing::EventBus;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// 事务内业务操作返回的 Future，借用 `TransactionScope`
pub type ScopedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, AppError>> + Send + 'a>>;

/// 事务性资源（如数据库会话）
///
/// 每次调用独占一个实例；各阶段均可能失败。
#[async_trait]
pub trait UnitOfWork: Send {
    async fn begin(&mut self) -> anyhow::Result<()>;

    async fn commit(&mut self) -> anyhow::Result<()>;

    async fn rollback(&mut self) -> anyhow::Result<()>;

    /// 释放底层资源，无论成功与否都会调用
    async fn cleanup(&mut self) -> anyhow::Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionState {
    #[default]
    Idle,
    Begun,
    Committed,
    RolledBack,
    CleanedUp,
}

impl TransactionState {
    fn advance(&mut self, next: TransactionState) {
        tracing::debug!(from = %self, to = %next, "transaction state");
        *self = next;
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionState::Idle => "idle",
            TransactionState::Begun => "begun",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled_back",
            TransactionState::CleanedUp => "cleaned_up",
        };
        f.write_str(s)
    }
}

/// 交给业务操作的事务作用域：持有事务性资源与待发布事件缓冲
pub struct TransactionScope<U> {
    uow: U,
    pending: Vec<SharedEvent>,
}

impl<U: UnitOfWork> TransactionScope<U> {
    fn new(uow: U) -> Self {
        Self {
            uow,
            pending: Vec::new(),
        }
    }

    pub fn uow(&self) -> &U {
        &self.uow
    }

    pub fn uow_mut(&mut self) -> &mut U {
        &mut self.uow
    }

    /// 取出聚合记录的全部事件并加入待发布缓冲，返回本次收集的数量
    pub fn collect<A: AggregateRoot>(&mut self, aggregate: &mut A) -> usize {
        let events = aggregate.pull_domain_events();
        let count = events.len();
        self.pending.extend(events);
        count
    }

    /// 直接加入一个不属于任何已加载聚合的事件
    pub fn add_event<E: DomainEvent>(&mut self, event: E) {
        self.pending.push(Arc::new(event));
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            tracing::debug!(discarded = self.pending.len(), "pending domain events discarded");
            self.pending.clear();
        }
    }
}

/// 事务管理器：串联 begin → 业务操作 → commit → 发布 → cleanup
#[derive(Clone)]
pub struct TransactionManager {
    event_bus: Arc<dyn EventBus>,
}

impl TransactionManager {
    pub fn new(event_bus: Arc<dyn EventBus>) -> Self {
        Self { event_bus }
    }

    pub fn event_bus(&self) -> &Arc<dyn EventBus> {
        &self.event_bus
    }

    /// 在事务内执行 `work`
    ///
    /// `work` 返回的 Future 借用作用域，捕获的外部状态需按值移入（如 `Arc` 克隆）。
    ///
    /// ```rust,ignore
    /// manager
    ///     .run(uow, move |scope| {
    ///         Box::pin(async move {
    ///             let mut account = repo.load(scope.uow_mut(), &id).await?;
    ///             account.deposit(100)?;
    ///             scope.collect(&mut account);
    ///             Ok(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    #[tracing::instrument(skip_all)]
    pub async fn run<U, T, F>(&self, uow: U, work: F) -> Result<T, AppError>
    where
        U: UnitOfWork,
        T: Send,
        F: for<'a> FnOnce(&'a mut TransactionScope<U>) -> ScopedFuture<'a, T> + Send,
    {
        let mut scope = TransactionScope::new(uow);
        let mut state = TransactionState::Idle;

        let outcome = self.execute(&mut scope, &mut state, work).await;

        let cleanup = scope.uow.cleanup().await;
        state.advance(TransactionState::CleanedUp);

        match (outcome, cleanup) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(source)) => {
                tracing::error!(error = %source, "transaction cleanup failed");
                Err(AppError::transaction(TransactionStage::Cleanup, source))
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(source)) => {
                tracing::error!(error = %source, "transaction cleanup failed");
                Err(err)
            }
        }
    }

    async fn execute<U, T, F>(
        &self,
        scope: &mut TransactionScope<U>,
        state: &mut TransactionState,
        work: F,
    ) -> Result<T, AppError>
    where
        U: UnitOfWork,
        T: Send,
        F: for<'a> FnOnce(&'a mut TransactionScope<U>) -> ScopedFuture<'a, T> + Send,
    {
        if let Err(source) = scope.uow.begin().await {
            tracing::error!(error = %source, "failed to begin transaction");
            return Err(AppError::transaction(TransactionStage::Begin, source));
        }
        state.advance(TransactionState::Begun);

        let value = match work(&mut *scope).await {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "unit of work failed");
                Self::rollback(scope, state).await;
                return Err(err);
            }
        };

        if let Err(source) = scope.uow.commit().await {
            tracing::error!(error = %source, "transaction commit failed");
            Self::rollback(scope, state).await;
            return Err(AppError::transaction(TransactionStage::Commit, source));
        }
        state.advance(TransactionState::Committed);

        let events = std::mem::take(&mut scope.pending);
        if events.is_empty() {
            return Ok(value);
        }

        if let Err(err) = self.event_bus.publish(&events).await {
            tracing::warn!(
                events = events.len(),
                error = %err,
                "domain event publication failed after commit; business state stays committed"
            );
            return Err(err.into());
        }
        tracing::debug!(events = events.len(), "domain events published");
        Ok(value)
    }

    // 回滚失败只记录日志，不覆盖触发回滚的原始错误
    async fn rollback<U: UnitOfWork>(scope: &mut TransactionScope<U>, state: &mut TransactionState) {
        scope.discard_pending();
        match scope.uow.rollback().await {
            Ok(()) => state.advance(TransactionState::RolledBack),
            Err(err) => tracing::error!(error = %err, "transaction rollback failed"),
        }
    }
}
