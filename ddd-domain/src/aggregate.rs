//! 聚合（Aggregate）与事件记录器
//!
//! 聚合只负责“记录”领域事件，从不自行发布：
//! - `record_event` 在业务逻辑执行期间按顺序追加事件；
//! - `pull_domain_events` 一次性取出并清空全部待发布事件，
//!   是领域逻辑与发布管线之间唯一的交接点。
//!
//! 事件的发布由事务边界（提交成功之后）统一完成。
//!
use crate::domain_event::{DomainEvent, SharedEvent};
use crate::entity::Entity;
use std::sync::Arc;

/// 待发布事件的有序记录
#[derive(Debug, Default)]
pub struct EventRecorder {
    pending: Vec<SharedEvent>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个事件
    pub fn record<E: DomainEvent>(&mut self, event: E) {
        self.pending.push(Arc::new(event));
    }

    /// 追加一个已共享的事件（如从其他记录器转交的事件）
    pub fn record_shared(&mut self, event: SharedEvent) {
        self.pending.push(event);
    }

    /// 按记录顺序取出全部事件并清空；为空时返回空列表
    pub fn pull_and_clear(&mut self) -> Vec<SharedEvent> {
        std::mem::take(&mut self.pending)
    }

    /// 尚未取出的事件（只读视图）
    pub fn pending(&self) -> &[SharedEvent] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// 聚合根接口
pub trait AggregateRoot: Entity {
    const TYPE: &'static str;

    fn recorder(&self) -> &EventRecorder;

    fn recorder_mut(&mut self) -> &mut EventRecorder;

    /// 记录领域事件，待事务提交后发布
    fn record_event<E: DomainEvent>(&mut self, event: E) {
        self.recorder_mut().record(event);
    }

    /// 取出并清空全部未发布事件
    fn pull_domain_events(&mut self) -> Vec<SharedEvent> {
        self.recorder_mut().pull_and_clear()
    }

    fn has_pending_events(&self) -> bool {
        !self.recorder().is_empty()
    }
}
