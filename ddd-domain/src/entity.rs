//! 实体（Entity）基础抽象
//!
//! 为聚合与实体提供统一的标识能力。
//!
use std::fmt::Display;

/// 具备唯一标识的实体抽象
pub trait Entity: Send + Sync {
    /// 实体标识类型，要求可显示与可克隆
    type Id: Clone + Display + Send + Sync;

    /// 获取实体标识
    fn id(&self) -> &Self::Id;
}
