use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 事件元数据
///
/// `event_id` 在创建时生成且永不复用（重试也不会生成新事件）。
#[derive(Builder, Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    #[builder(into, default = Uuid::new_v4().to_string())]
    event_id: String,
    #[builder(default = Utc::now())]
    occurred_on: DateTime<Utc>,
    #[builder(into)]
    aggregate_id: String,
}

impl EventMeta {
    /// 为指定聚合创建新的事件元数据
    pub fn new(aggregate_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            occurred_on: Utc::now(),
            aggregate_id: aggregate_id.into(),
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }
}
