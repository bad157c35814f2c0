//! DDD 领域层基础库（ddd-domain）
//!
//! 提供以 DDD 为中心的通用抽象与构件，用于在应用中实现：
//! - 聚合（`aggregate`）与实体（`entity`）建模，聚合只记录事件、不发布事件
//! - 领域事件（`domain_event`）及其结构化持久形态（`persist`）
//! - 事件系统（`eventing`）：顺序扇出的事件总线、订阅者与失败转存/回放
//!
//! 本 crate 尽量保持与存储与传输实现解耦，仅定义领域层接口、最小参考实现
//! 与必要的错误类型，以便在不同基础设施上进行适配实现。
//!
//! 典型用法：
//! 1. 定义聚合与事件，在业务方法中调用 `record_event`；
//! 2. 选择 `persist` 中的失败存储实现（内存或文件目录）；
//! 3. 使用 `eventing` 组装事件总线与订阅者；
//! 4. 在应用层事务边界内提交后，取出聚合事件并交由总线发布。
//!
pub mod aggregate;
pub mod domain_event;
pub mod entity;
pub mod error;
#[cfg(feature = "eventing")]
pub mod eventing;
pub mod persist;
