/// 失败转存与显式回放示例
/// 订阅者失败 -> 事件写入文件目录 -> 另起发布器实例取出并回放
use anyhow::Result as AnyResult;
use async_trait::async_trait;
use ddd_domain::aggregate::{AggregateRoot, EventRecorder};
use ddd_domain::domain_event::{AnyEvent, DomainEvent, EventMeta, EventType};
use ddd_domain::entity::Entity;
use ddd_domain::eventing::{
    DomainEventFailoverPublisher, DomainEventSubscriber, EventBus, FailedEventReplayer,
    InMemoryEventBus, SubscribedTo,
};
use ddd_domain::persist::{FailoverConfig, FileFailoverStore, SerializedEvent};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Serialize)]
struct OrderPlaced {
    #[serde(flatten)]
    meta: EventMeta,
    total_cents: u64,
}

impl DomainEvent for OrderPlaced {
    const NAME: &'static str = "order.placed";
    fn meta(&self) -> &EventMeta {
        &self.meta
    }
}

#[derive(Debug, Default)]
struct Order {
    id: String,
    events: EventRecorder,
}

impl Entity for Order {
    type Id = String;
    fn id(&self) -> &String {
        &self.id
    }
}

impl AggregateRoot for Order {
    const TYPE: &'static str = "order";

    fn recorder(&self) -> &EventRecorder {
        &self.events
    }

    fn recorder_mut(&mut self) -> &mut EventRecorder {
        &mut self.events
    }
}

impl Order {
    fn place(id: &str, total_cents: u64) -> Self {
        let mut order = Order {
            id: id.into(),
            ..Default::default()
        };
        order.record_event(OrderPlaced {
            meta: EventMeta::new(id),
            total_cents,
        });
        order
    }
}

/// 可切换在线状态的下游通知
struct Warehouse {
    online: Arc<AtomicBool>,
}

#[async_trait]
impl DomainEventSubscriber for Warehouse {
    fn subscriber_name(&self) -> &str {
        "warehouse"
    }

    fn subscribed_to(&self) -> SubscribedTo {
        SubscribedTo::One(EventType::of::<OrderPlaced>())
    }

    async fn on(&self, event: &dyn AnyEvent) -> anyhow::Result<()> {
        if !self.online.load(Ordering::SeqCst) {
            anyhow::bail!("warehouse unreachable");
        }
        println!("warehouse notified: {}", event.aggregate_id());
        Ok(())
    }
}

/// 回放路径：这里直接打印结构化记录，实际可转发到消息系统
struct PrintReplayer;

#[async_trait]
impl FailedEventReplayer for PrintReplayer {
    async fn replay(&self, event: &SerializedEvent) -> anyhow::Result<()> {
        println!(
            "replayed {} {} -> {}",
            event.event_type(),
            event.event_id(),
            String::from_utf8(event.to_json()?)?
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dir = tempfile::tempdir()?;
    let config = FailoverConfig::builder()
        .directory(dir.path().join("failed_domain_events"))
        .build();

    let online = Arc::new(AtomicBool::new(false));
    let bus = InMemoryEventBus::builder()
        .subscribers(vec![Arc::new(Warehouse {
            online: online.clone(),
        })])
        .failover(DomainEventFailoverPublisher::new(Arc::new(
            FileFailoverStore::open(config.clone()).await?,
        )))
        .build();

    let mut order = Order::place("o-1001", 4_990);
    if let Err(err) = bus.publish(&order.pull_domain_events()).await {
        eprintln!("publish failed: {err}");
    }

    // 另一个进程（或定时任务）负责回放
    online.store(true, Ordering::SeqCst);
    let failover = DomainEventFailoverPublisher::new(Arc::new(FileFailoverStore::open(config).await?));
    println!("pending records: {}", failover.pending_count().await?);

    let report = failover.replay(&PrintReplayer).await?;
    println!(
        "replayed={}, retained={}, pending={}",
        report.replayed,
        report.retained,
        failover.pending_count().await?
    );
    Ok(())
}
