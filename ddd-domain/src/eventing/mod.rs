//! 事件子系统（eventing）
//!
//! 提供领域事件发布与失败转存的基础抽象与进程内实现：
//! - `EventBus`：批量发布接口；
//! - `DomainEventSubscriber`：声明订阅类型并消费事件；
//! - `SubscriberRegistry`：按事件类型预建索引的订阅者注册表；
//! - `InMemoryEventBus`：顺序扇出，失败时先转存再返回错误；
//! - `DomainEventFailoverPublisher`：失败事件的持久转存、取出与显式回放。
//!
//! 该模块不绑定具体传输实现，跨进程投递由回放器对接外部系统完成。
//!
pub mod bus;
pub mod bus_inmemory;
pub mod failover;
pub mod registry;
pub mod subscriber;

pub use bus::{EventBus, EventBusConfig, PublishPolicy};
pub use bus_inmemory::InMemoryEventBus;
pub use failover::{DomainEventFailoverPublisher, FailedEventReplayer, ReplayReport};
pub use registry::SubscriberRegistry;
pub use subscriber::{DomainEventSubscriber, SubscribedTo};
