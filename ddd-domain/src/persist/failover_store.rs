use crate::{
    error::{DomainError, DomainResult},
    persist::SerializedEvent,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// 失败事件的持久存储：每个键对应一条结构化记录
///
/// 键由调用方保证唯一，实现方无需加锁去重；`list_keys` 须按字典序升序返回。
/// `remove` 仅在本次调用实际删除了记录时返回 `true`，键已不存在时返回 `false`。
#[async_trait]
pub trait FailoverStore: Send + Sync {
    async fn append(&self, key: &str, record: &SerializedEvent) -> DomainResult<()>;

    async fn list_keys(&self) -> DomainResult<Vec<String>>;

    async fn read(&self, key: &str) -> DomainResult<SerializedEvent>;

    async fn remove(&self, key: &str) -> DomainResult<bool>;
}

/// 内存版失败存储，适用于测试与本地开发（进程退出即丢失）
#[derive(Default)]
pub struct InMemoryFailoverStore {
    records: Mutex<BTreeMap<String, SerializedEvent>>,
}

impl InMemoryFailoverStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|g| g.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned(key: &str) -> DomainError {
        DomainError::failover_store(key, "store lock poisoned")
    }
}

#[async_trait]
impl FailoverStore for InMemoryFailoverStore {
    async fn append(&self, key: &str, record: &SerializedEvent) -> DomainResult<()> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned(key))?;
        if records.contains_key(key) {
            return Err(DomainError::failover_store(key, "key already exists"));
        }
        records.insert(key.to_string(), record.clone());
        Ok(())
    }

    async fn list_keys(&self) -> DomainResult<Vec<String>> {
        let records = self.records.lock().map_err(|_| Self::poisoned("*"))?;
        Ok(records.keys().cloned().collect())
    }

    async fn read(&self, key: &str) -> DomainResult<SerializedEvent> {
        let records = self.records.lock().map_err(|_| Self::poisoned(key))?;
        records.get(key).cloned().ok_or_else(|| DomainError::NotFound {
            reason: format!("failover record {key}"),
        })
    }

    async fn remove(&self, key: &str) -> DomainResult<bool> {
        let mut records = self.records.lock().map_err(|_| Self::poisoned(key))?;
        Ok(records.remove(key).is_some())
    }
}
