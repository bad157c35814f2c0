//! 事件结构化形态（SerializedEvent）
//!
//! 事件在持久化与跨边界传输时的标准形态：
//!
//! ```json
//! {
//!   "data": { "id": "..", "type": "..", "occurred_on": "..", "attributes": { .. } },
//!   "meta": { "version": "1.0" }
//! }
//! ```
//!
//! 失败转存存储的每条记录即为一个 `SerializedEvent`。
//!
use crate::{
    domain_event::AnyEvent,
    error::{DomainError, DomainResult},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 当前结构化格式版本
pub const CURRENT_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedEvent {
    data: EventData,
    meta: SerializedMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct EventData {
    /// 事件唯一标识符
    id: String,
    /// 事件类型（事件的稳定名称）
    #[serde(rename = "type")]
    event_type: String,
    /// 事件发生时间（ISO 8601）
    occurred_on: String,
    /// 事件字段的原始值映射
    attributes: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SerializedMeta {
    version: String,
}

impl SerializedEvent {
    /// 由已知字段直接构造（用于回放与测试）
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        occurred_on: DateTime<Utc>,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            data: EventData {
                id: event_id.into(),
                event_type: event_type.into(),
                occurred_on: occurred_on.to_rfc3339_opts(SecondsFormat::AutoSi, true),
                attributes,
            },
            meta: SerializedMeta {
                version: CURRENT_FORMAT_VERSION.to_string(),
            },
        }
    }

    pub fn event_id(&self) -> &str {
        &self.data.id
    }

    pub fn event_type(&self) -> &str {
        &self.data.event_type
    }

    /// 解析事件发生时间
    pub fn occurred_on(&self) -> DomainResult<DateTime<Utc>> {
        let at = DateTime::parse_from_rfc3339(&self.data.occurred_on)?;
        Ok(at.with_timezone(&Utc))
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.data.attributes
    }

    pub fn aggregate_id(&self) -> Option<&str> {
        self.data.attributes.get("aggregate_id").and_then(Value::as_str)
    }

    pub fn version(&self) -> &str {
        &self.meta.version
    }

    pub fn to_json(&self) -> DomainResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// 从 JSON 文档解析，拒绝未知格式版本
    pub fn from_json(bytes: &[u8]) -> DomainResult<Self> {
        let event: SerializedEvent = serde_json::from_slice(bytes)?;
        if event.meta.version != CURRENT_FORMAT_VERSION {
            return Err(DomainError::UnsupportedFormat {
                version: event.meta.version,
            });
        }
        Ok(event)
    }
}

impl TryFrom<&dyn AnyEvent> for SerializedEvent {
    type Error = DomainError;

    fn try_from(event: &dyn AnyEvent) -> Result<Self, Self::Error> {
        let meta = event.event_meta();
        Ok(SerializedEvent::new(
            meta.event_id(),
            event.event_type().name(),
            meta.occurred_on(),
            event.to_primitives()?,
        ))
    }
}
