use bon::Builder;

/// 应用层上下文（Application Context）
///
/// 承载一次应用层调用（命令/查询）所需的横切信息，例如：
/// - 关联追踪 `correlation_id`、因果链 `causation_id`；
/// - 执行者类型/ID，用于审计与日志；
/// - 幂等键（`idempotency_key`）：用于在基础设施层实现请求幂等（如 API 层重复提交保护）。
///
/// 典型用法：
/// ```rust
/// use ddd_application::context::AppContext;
///
/// let ctx = AppContext::builder()
///     .correlation_id("cor-123")
///     .causation_id("cau-abc")
///     .actor_type("user")
///     .actor_id("u-1")
///     .idempotency_key("idem-xyz")
///     .build();
/// assert_eq!(ctx.correlation_id(), Some("cor-123"));
/// ```
#[derive(Builder, Clone, Debug, Default)]
pub struct AppContext {
    /// 关联ID
    #[builder(into)]
    correlation_id: Option<String>,
    /// 因果ID
    #[builder(into)]
    causation_id: Option<String>,
    /// 触发调用的主体类型（如用户、系统等）
    #[builder(into)]
    actor_type: Option<String>,
    /// 触发调用的主体ID
    #[builder(into)]
    actor_id: Option<String>,
    /// 幂等键（可选）：为空则由上层或基础设施决定是否参与幂等
    #[builder(into)]
    idempotency_key: Option<String>,
}

impl AppContext {
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    pub fn actor_type(&self) -> Option<&str> {
        self.actor_type.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref()
    }
}
