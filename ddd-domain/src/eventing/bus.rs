//! 事件总线（EventBus）协议
//!
//! 定义一批领域事件的发布抽象。发布在事务提交之后进行，
//! 同一批次内的事件按记录顺序逐个投递。
//!
use crate::{domain_event::SharedEvent, error::DomainResult as Result};
use async_trait::async_trait;

/// 事件总线：负责将事件分发给订阅者
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, events: &[SharedEvent]) -> Result<()>;

    async fn publish_one(&self, event: SharedEvent) -> Result<()> {
        self.publish(std::slice::from_ref(&event)).await
    }
}

/// 批次中某事件失败后的处理策略
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PublishPolicy {
    /// 首个失败事件即中止，后续事件不再投递
    #[default]
    FailFast,
    /// 逐事件隔离：失败事件转存后继续投递剩余事件，批次结束后返回首个错误
    IsolatePerEvent,
}

/// 事件总线配置
#[derive(Clone, Copy, Debug, Default)]
pub struct EventBusConfig {
    pub policy: PublishPolicy,
}
