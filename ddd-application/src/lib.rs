//! DDD 应用层（ddd-application）
//!
//! - 命令/查询总线：按消息类型路由到唯一处理器（`InMemoryCommandBus` / `InMemoryQueryBus`）；
//! - 事务边界：`TransactionManager` 在提交成功后经 `EventBus` 发布聚合记录的领域事件；
//! - 查询缓存：`CachedQueryHandler` 以键策略与过期时间包装查询处理器。
//!
pub mod cache;
pub mod command;
pub mod command_bus;
pub mod command_handler;
pub mod context;
pub mod error;
pub mod inmemory_command_bus;
pub mod inmemory_query_bus;
pub mod query;
pub mod query_bus;
pub mod query_handler;
pub mod response;
pub mod transaction;

pub use cache::{Cache, CachedQueryHandler, InMemoryCache};
pub use inmemory_command_bus::InMemoryCommandBus;
pub use inmemory_query_bus::InMemoryQueryBus;
pub use transaction::{TransactionManager, TransactionScope, TransactionState, UnitOfWork};
