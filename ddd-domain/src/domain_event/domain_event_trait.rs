use super::metadata::EventMeta;
use crate::error::DomainResult;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 领域事件载荷需要满足的通用能力边界
///
/// 事件是不可变的事实，身份由 `event_id` 决定，不要求值相等。
/// 建议将 [`EventMeta`] 以 `#[serde(flatten)]` 嵌入事件结构体。
pub trait DomainEvent: Serialize + fmt::Debug + Send + Sync + 'static {
    /// 事件的稳定名称（结构化形态中的 `data.type`），不随重构变化
    const NAME: &'static str;

    /// 事件元数据（标识、发生时间、聚合标识）
    fn meta(&self) -> &EventMeta;

    /// 事件唯一标识
    fn event_id(&self) -> &str {
        self.meta().event_id()
    }

    /// 事件发生时间
    fn occurred_on(&self) -> DateTime<Utc> {
        self.meta().occurred_on()
    }

    /// 事件所属聚合标识
    fn aggregate_id(&self) -> &str {
        self.meta().aggregate_id()
    }
}

/// 事件类型标识：以 `TypeId` 作为稳定键，名称仅用于日志与诊断
#[derive(Clone, Copy)]
pub struct EventType {
    id: TypeId,
    name: &'static str,
}

impl EventType {
    pub fn of<E: DomainEvent>() -> Self {
        Self {
            id: TypeId::of::<E>(),
            name: E::NAME,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for EventType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventType {}

impl Hash for EventType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventType").field(&self.name).finish()
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// 类型擦除后的领域事件视图，便于在同一批次中承载不同事件类型
///
/// 对所有 [`DomainEvent`] 自动实现，无需手动实现。
pub trait AnyEvent: fmt::Debug + Send + Sync {
    fn event_type(&self) -> EventType;

    fn event_meta(&self) -> &EventMeta;

    /// 转换为原始结构（字符串键到原始值的映射）
    fn to_primitives(&self) -> DomainResult<Map<String, Value>>;

    fn as_any(&self) -> &dyn Any;
}

impl<E: DomainEvent> AnyEvent for E {
    fn event_type(&self) -> EventType {
        EventType::of::<E>()
    }

    fn event_meta(&self) -> &EventMeta {
        self.meta()
    }

    fn to_primitives(&self) -> DomainResult<Map<String, Value>> {
        let mut attributes = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        // 元数据字段始终存在，即便事件未 flatten 元数据
        let meta = self.meta();
        attributes.insert("event_id".into(), Value::from(meta.event_id()));
        attributes.insert(
            "occurred_on".into(),
            Value::from(meta.occurred_on().to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        );
        attributes.insert("aggregate_id".into(), Value::from(meta.aggregate_id()));

        Ok(attributes)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<'a> dyn AnyEvent + 'a {
    /// 还原为具体事件类型
    pub fn downcast_ref<E: DomainEvent>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    pub fn is<E: DomainEvent>(&self) -> bool {
        self.event_type() == EventType::of::<E>()
    }

    pub fn event_id(&self) -> &str {
        self.event_meta().event_id()
    }

    pub fn aggregate_id(&self) -> &str {
        self.event_meta().aggregate_id()
    }
}

/// 可在总线、订阅者与失败转存之间共享的事件句柄
pub type SharedEvent = Arc<dyn AnyEvent>;
