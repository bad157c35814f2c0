//! 持久化（persist）
//!
//! 定义事件的结构化持久形态与失败事件存储：
//! - 事件结构化形态（`SerializedEvent`），用于持久化与跨边界传输；
//! - 失败事件存储协议（`FailoverStore`）及其内存、文件目录实现。
//!
//! 该模块聚焦协议与最小参考实现，其他存储后端由上层提供实现并注入。
//!
mod failover_store;
#[cfg(feature = "eventing")]
mod failover_store_file;
mod serialized_event;

pub use failover_store::{FailoverStore, InMemoryFailoverStore};
#[cfg(feature = "eventing")]
pub use failover_store_file::{FailoverConfig, FileFailoverStore};
pub use serialized_event::{CURRENT_FORMAT_VERSION, SerializedEvent};
