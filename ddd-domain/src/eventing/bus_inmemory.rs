//! 内存版事件总线（InMemoryEventBus）
//!
//! 进程内的顺序扇出实现，满足 `EventBus` 协议：
//! - 按记录顺序处理批次中的每个事件；
//! - 对每个事件按声明顺序依次调用订阅者（不并发），便于确定性排查；
//! - 任一订阅者失败时，先将该事件写入失败转存，再返回原始错误。
//!
//! 注意：投递不具备批次原子性，失败事件之前已投递的事件不会回滚。

use crate::domain_event::SharedEvent;
use crate::error::{DomainError, DomainResult as Result};
use crate::eventing::{
    DomainEventFailoverPublisher, DomainEventSubscriber, EventBus, EventBusConfig, PublishPolicy,
    SubscriberRegistry,
};
use async_trait::async_trait;
use bon::Builder;
use std::sync::Arc;

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::in_memory_event_bus_builder::{IsUnset, SetRegistry, State as BuilderState};

#[derive(Builder)]
pub struct InMemoryEventBus {
    #[builder(setters(vis = "pub(crate)"))]
    registry: SubscriberRegistry,
    failover: DomainEventFailoverPublisher,
    #[builder(default)]
    config: EventBusConfig,
}

impl<S: BuilderState> InMemoryEventBusBuilder<S> {
    /// 以订阅者列表构建注册表（仅可调用一次）
    pub fn subscribers(
        self,
        subscribers: Vec<Arc<dyn DomainEventSubscriber>>,
    ) -> InMemoryEventBusBuilder<SetRegistry<S>>
    where
        <S as BuilderState>::Registry: IsUnset,
    {
        self.registry(SubscriberRegistry::new(subscribers))
    }
}

impl InMemoryEventBus {
    pub fn policy(&self) -> PublishPolicy {
        self.config.policy
    }

    pub fn failover(&self) -> &DomainEventFailoverPublisher {
        &self.failover
    }

    /// 将单个事件依次投递给其全部订阅者，首个失败即返回
    async fn dispatch(&self, event: &SharedEvent) -> Result<()> {
        let event_type = event.event_type();
        let subscribers = self.registry.matching(event_type);
        if subscribers.is_empty() {
            tracing::trace!(%event_type, "no subscribers");
            return Ok(());
        }

        for subscriber in subscribers {
            if let Err(source) = subscriber.on(event.as_ref()).await {
                return Err(DomainError::EventPublication {
                    subscriber: subscriber.subscriber_name().to_string(),
                    event_type: event_type.name(),
                    event_id: event.event_id().to_string(),
                    source,
                });
            }
        }
        Ok(())
    }

    /// 转存失败事件；转存本身失败只记录日志，不覆盖原始错误
    async fn capture(&self, event: &SharedEvent, cause: &DomainError) {
        tracing::warn!(
            event_id = event.event_id(),
            event_type = %event.event_type(),
            error = %cause,
            "domain event publication failed"
        );
        if let Err(err) = self.failover.publish(event.as_ref()).await {
            tracing::error!(
                event_id = event.event_id(),
                error = %err,
                "failed to capture domain event for replay"
            );
        }
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    #[tracing::instrument(skip_all, fields(events = events.len(), policy = ?self.config.policy))]
    async fn publish(&self, events: &[SharedEvent]) -> Result<()> {
        let mut first_error: Option<DomainError> = None;

        for event in events {
            let Err(err) = self.dispatch(event).await else {
                continue;
            };

            self.capture(event, &err).await;
            match self.config.policy {
                PublishPolicy::FailFast => return Err(err),
                PublishPolicy::IsolatePerEvent => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
