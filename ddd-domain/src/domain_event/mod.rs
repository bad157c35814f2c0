//! 领域事件（Domain Event）
//!
//! 定义事件载荷需要实现的最小接口（`DomainEvent`）、类型擦除视图（`AnyEvent`）、
//! 稳定的事件类型标识（`EventType`）以及事件元数据（`EventMeta`）。

mod domain_event_trait;
mod metadata;

pub use domain_event_trait::{AnyEvent, DomainEvent, EventType, SharedEvent};
pub use metadata::EventMeta;
