//! 领域事件订阅者（DomainEventSubscriber）
//!
//! 定义消费某类/多类/全部事件的处理逻辑与元信息（名称、订阅类型）。
//!
use crate::domain_event::{AnyEvent, EventType};
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub enum SubscribedTo {
    One(EventType),
    Many(Vec<EventType>),
    All,
}

/// 事件订阅者：处理其声明订阅的事件类型
///
/// `on` 返回的错误会原样保留在 `DomainError::EventPublication` 的 `source` 中。
#[async_trait]
pub trait DomainEventSubscriber: Send + Sync {
    /// 订阅者名称（用于失败记录与日志）
    fn subscriber_name(&self) -> &str;
    /// 返回该订阅者关心的事件类型
    fn subscribed_to(&self) -> SubscribedTo;
    /// 处理事件
    async fn on(&self, event: &dyn AnyEvent) -> anyhow::Result<()>;
}
