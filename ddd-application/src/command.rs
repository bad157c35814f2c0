/// 应用层命令（Command）
///
/// 表达“意图”的写操作请求，通常会修改领域状态。
/// - 不可变、无标识的值，仅携带处理器所需字段；
/// - 由唯一的处理器消费一次，不返回业务数据，仅表达执行结果（成功/失败）；
/// - 与 [`Query`](crate::query::Query) 相对，`Command` 应避免读写混用；
/// - 建议保持语义化的“动宾结构”命名，如 `CreateUser`、`CloseOrder`。
///
/// 路由以命令的具体类型（`TypeId`）为键，`NAME` 仅用于日志、追踪与错误信息。
pub trait Command: Send + Sync + 'static {
    /// 命令的稳定名称（建议常量字符串，不随重构变化）
    const NAME: &'static str;
}
