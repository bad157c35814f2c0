//! 失败事件转存（DomainEventFailoverPublisher）
//!
//! 事件发布失败时，将其结构化形态持久地写入失败存储，以便之后显式回放：
//! - `publish`：以“捕获时间-事件ID”为键写入，键唯一且按时间可排序；
//! - `drain`：按键顺序读取并删除全部记录，同一记录绝不会被返回两次；
//! - `replay`：逐条交给外部回放器，回放成功后才删除，失败的记录原键保留。
//!
//! 回放从不在热路径上自动触发。
//!
use crate::{
    domain_event::AnyEvent,
    error::{DomainError, DomainResult as Result},
    persist::{FailoverStore, SerializedEvent},
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

/// 捕获时间格式：ISO 8601 基本格式（UTC，微秒），字典序即时间序，且可用作文件名
const CAPTURE_TIME_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// 失败事件回放器：由调用方提供具体回放路径（如重新发布到事件总线）
#[async_trait]
pub trait FailedEventReplayer: Send + Sync {
    async fn replay(&self, event: &SerializedEvent) -> anyhow::Result<()>;
}

/// 一次回放的结果统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    /// 回放失败或无法读取、仍留在存储中的记录数
    pub retained: usize,
}

#[derive(Clone)]
pub struct DomainEventFailoverPublisher {
    store: Arc<dyn FailoverStore>,
}

impl DomainEventFailoverPublisher {
    pub fn new(store: Arc<dyn FailoverStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FailoverStore> {
        &self.store
    }

    /// 转存一个发布失败的事件，返回记录键
    #[tracing::instrument(
        skip(self, event),
        fields(event_id = %event.event_id(), event_type = %event.event_type())
    )]
    pub async fn publish(&self, event: &dyn AnyEvent) -> Result<String> {
        let record = SerializedEvent::try_from(event)?;
        self.capture(&record).await
    }

    async fn capture(&self, record: &SerializedEvent) -> Result<String> {
        let key = record_key(record.event_id());
        self.store.append(&key, record).await?;
        tracing::warn!(%key, event_id = record.event_id(), "domain event captured for replay");
        Ok(key)
    }

    /// 读取并删除全部失败记录，按捕获时间顺序返回
    ///
    /// 无法解析的记录保留在存储中；删除失败的记录不在本次返回，留待下次取出。
    /// 只有本次调用实际删除的记录才会被返回，并发的 `drain` 不会拿到同一条记录。
    #[tracing::instrument(skip(self))]
    pub async fn drain(&self) -> Result<Vec<SerializedEvent>> {
        let keys = self.store.list_keys().await?;
        let mut drained = Vec::with_capacity(keys.len());

        for key in keys {
            let record = match self.store.read(&key).await {
                Ok(record) => record,
                Err(err) => {
                    tracing::error!(%key, error = %err, "failover record unreadable, left in place");
                    continue;
                }
            };
            match self.store.remove(&key).await {
                Ok(true) => drained.push(record),
                Ok(false) => tracing::debug!(%key, "failover record taken by another drain"),
                Err(err) => {
                    tracing::error!(%key, error = %err, "failover record not removed, deferred");
                }
            }
        }

        tracing::info!(count = drained.len(), "failover store drained");
        Ok(drained)
    }

    /// 按键顺序逐条回放；记录只在回放成功后删除
    ///
    /// 回放失败或无法读取的记录保持原键不动，留待下次回放。
    #[tracing::instrument(skip(self, replayer))]
    pub async fn replay(&self, replayer: &dyn FailedEventReplayer) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();

        for key in self.store.list_keys().await? {
            let record = match self.store.read(&key).await {
                Ok(record) => record,
                Err(DomainError::NotFound { .. }) => continue,
                Err(err) => {
                    tracing::error!(%key, error = %err, "failover record unreadable, left in place");
                    report.retained += 1;
                    continue;
                }
            };

            if let Err(err) = replayer.replay(&record).await {
                tracing::warn!(%key, event_id = record.event_id(), error = %err, "replay failed");
                report.retained += 1;
                continue;
            }

            report.replayed += 1;
            if let Err(err) = self.store.remove(&key).await {
                tracing::error!(%key, error = %err, "replayed record not removed, may replay again");
            }
        }

        tracing::info!(
            replayed = report.replayed,
            retained = report.retained,
            "failover replay finished"
        );
        Ok(report)
    }

    pub async fn pending_count(&self) -> Result<usize> {
        Ok(self.store.list_keys().await?.len())
    }
}

fn record_key(event_id: &str) -> String {
    format!("{}-{}", Utc::now().format(CAPTURE_TIME_FORMAT), event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_event::{DomainEvent, EventMeta};
    use crate::persist::{FailoverConfig, FileFailoverStore, InMemoryFailoverStore};
    use serde::Serialize;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Barrier;
    use tokio::task::JoinSet;

    #[derive(Debug, Serialize)]
    struct Shipped {
        #[serde(flatten)]
        meta: EventMeta,
        carrier: String,
    }

    impl DomainEvent for Shipped {
        const NAME: &'static str = "order.shipped";
        fn meta(&self) -> &EventMeta {
            &self.meta
        }
    }

    fn shipped(carrier: &str) -> Shipped {
        Shipped {
            meta: EventMeta::new("o-1"),
            carrier: carrier.into(),
        }
    }

    fn publisher() -> (Arc<InMemoryFailoverStore>, DomainEventFailoverPublisher) {
        let store = Arc::new(InMemoryFailoverStore::new());
        (store.clone(), DomainEventFailoverPublisher::new(store))
    }

    #[test]
    fn keys_sort_by_capture_time_and_embed_event_id() {
        let a = record_key("e-1");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = record_key("e-0");
        assert!(a < b);
        assert!(a.ends_with("-e-1"));
        assert!(!a.contains(':'));
    }

    #[tokio::test]
    async fn drain_returns_each_record_once() {
        let (store, failover) = publisher();
        let ev = shipped("ups");
        failover.publish(&ev).await.unwrap();
        assert_eq!(store.len(), 1);

        let first = failover.drain().await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].event_id(), ev.event_id());
        assert_eq!(first[0].event_type(), "order.shipped");
        assert_eq!(first[0].attributes()["carrier"], "ups");

        assert!(failover.drain().await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn same_instant_captures_do_not_collide() {
        let (_store, failover) = publisher();
        for _ in 0..50 {
            failover.publish(&shipped("dhl")).await.unwrap();
        }
        assert_eq!(failover.pending_count().await.unwrap(), 50);
    }

    struct FlakyReplayer {
        fail_carrier: &'static str,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FailedEventReplayer for FlakyReplayer {
        async fn replay(&self, event: &SerializedEvent) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(event.event_id().to_string());
            if event.attributes()["carrier"] == self.fail_carrier {
                anyhow::bail!("downstream unavailable");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn failed_replays_stay_under_their_key() {
        let (store, failover) = publisher();
        failover.publish(&shipped("ups")).await.unwrap();
        let fedex_key = failover.publish(&shipped("fedex")).await.unwrap();

        let replayer = FlakyReplayer {
            fail_carrier: "fedex",
            seen: Mutex::new(Vec::new()),
        };
        let report = failover.replay(&replayer).await.unwrap();
        assert_eq!(
            report,
            ReplayReport {
                replayed: 1,
                retained: 1
            }
        );
        assert_eq!(replayer.seen.lock().unwrap().len(), 2);
        assert_eq!(store.list_keys().await.unwrap(), vec![fedex_key]);

        let left = failover.drain().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].attributes()["carrier"], "fedex");
    }

    /// 可在运行中切换为拒绝写入的存储
    #[derive(Default)]
    struct ReadOnlyAfterCapture {
        inner: InMemoryFailoverStore,
        frozen: AtomicBool,
    }

    #[async_trait]
    impl FailoverStore for ReadOnlyAfterCapture {
        async fn append(&self, key: &str, record: &SerializedEvent) -> Result<()> {
            if self.frozen.load(Ordering::SeqCst) {
                return Err(DomainError::failover_store(key, "disk full"));
            }
            self.inner.append(key, record).await
        }
        async fn list_keys(&self) -> Result<Vec<String>> {
            self.inner.list_keys().await
        }
        async fn read(&self, key: &str) -> Result<SerializedEvent> {
            self.inner.read(key).await
        }
        async fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key).await
        }
    }

    struct Unreachable;

    #[async_trait]
    impl FailedEventReplayer for Unreachable {
        async fn replay(&self, _event: &SerializedEvent) -> anyhow::Result<()> {
            anyhow::bail!("downstream unavailable")
        }
    }

    #[tokio::test]
    async fn failed_replay_keeps_records_when_store_rejects_writes() {
        let store = Arc::new(ReadOnlyAfterCapture::default());
        let failover = DomainEventFailoverPublisher::new(store.clone());
        for carrier in ["ups", "dhl", "fedex"] {
            failover.publish(&shipped(carrier)).await.unwrap();
        }
        let keys = store.list_keys().await.unwrap();
        store.frozen.store(true, Ordering::SeqCst);

        let report = failover.replay(&Unreachable).await.unwrap();
        assert_eq!(report.replayed, 0);
        assert_eq!(report.retained, 3);
        assert_eq!(store.list_keys().await.unwrap(), keys);
    }

    /// 读取时在屏障处等待，使两个 `drain` 同时读到同一条记录
    struct LockstepStore {
        inner: InMemoryFailoverStore,
        gate: Barrier,
    }

    #[async_trait]
    impl FailoverStore for LockstepStore {
        async fn append(&self, key: &str, record: &SerializedEvent) -> Result<()> {
            self.inner.append(key, record).await
        }
        async fn list_keys(&self) -> Result<Vec<String>> {
            self.inner.list_keys().await
        }
        async fn read(&self, key: &str) -> Result<SerializedEvent> {
            let record = self.inner.read(key).await;
            self.gate.wait().await;
            record
        }
        async fn remove(&self, key: &str) -> Result<bool> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn concurrent_drains_split_records() {
        let failover = DomainEventFailoverPublisher::new(Arc::new(LockstepStore {
            inner: InMemoryFailoverStore::new(),
            gate: Barrier::new(2),
        }));
        let ev = shipped("ups");
        failover.publish(&ev).await.unwrap();

        let (a, b) = tokio::join!(failover.drain(), failover.drain());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.len() + b.len(), 1);
        let got = a.first().or(b.first()).unwrap();
        assert_eq!(got.event_id(), ev.event_id());
        assert_eq!(failover.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_captures_to_file_store_are_all_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileFailoverStore::open(
            FailoverConfig::builder()
                .directory(tmp.path().join("failed"))
                .build(),
        )
        .await
        .unwrap();
        let failover = DomainEventFailoverPublisher::new(Arc::new(store));

        const WRITERS: usize = 32;
        let mut tasks = JoinSet::new();
        for n in 0..WRITERS {
            let failover = failover.clone();
            tasks.spawn(async move {
                let ev = shipped(&format!("carrier-{n}"));
                failover.publish(&ev).await.map(|_| ev.event_id().to_string())
            });
        }

        let mut published = HashSet::new();
        while let Some(joined) = tasks.join_next().await {
            published.insert(joined.unwrap().unwrap());
        }
        assert_eq!(published.len(), WRITERS);
        assert_eq!(failover.store().list_keys().await.unwrap().len(), WRITERS);

        let drained: HashSet<String> = failover
            .drain()
            .await
            .unwrap()
            .iter()
            .map(|r| r.event_id().to_string())
            .collect();
        assert_eq!(drained, published);
    }

    struct BrokenStore;

    #[async_trait]
    impl FailoverStore for BrokenStore {
        async fn append(&self, key: &str, _record: &SerializedEvent) -> Result<()> {
            Err(DomainError::failover_store(key, "disk full"))
        }
        async fn list_keys(&self) -> Result<Vec<String>> {
            Ok(vec!["k-1".into()])
        }
        async fn read(&self, key: &str) -> Result<SerializedEvent> {
            Err(DomainError::failover_store(key, "corrupt"))
        }
        async fn remove(&self, _key: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn unreadable_records_are_skipped_not_dropped() {
        let failover = DomainEventFailoverPublisher::new(Arc::new(BrokenStore));
        assert!(failover.drain().await.unwrap().is_empty());
        assert_eq!(failover.replay(&Unreachable).await.unwrap().retained, 1);
        assert!(failover.publish(&shipped("ups")).await.is_err());
    }
}
