//! 订阅者注册表（SubscriberRegistry）
//!
//! 在组装阶段由声明的订阅者列表一次性构建，按事件类型预先建立索引，
//! 之后只读使用。解析结果始终保持订阅者的声明顺序。
//!
use super::subscriber::{DomainEventSubscriber, SubscribedTo};
use crate::domain_event::EventType;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

type Indexed = (usize, Arc<dyn DomainEventSubscriber>);

#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    by_type: HashMap<TypeId, Vec<Indexed>>,
    all: Vec<Indexed>,
    len: usize,
}

impl SubscriberRegistry {
    pub fn new(subscribers: Vec<Arc<dyn DomainEventSubscriber>>) -> Self {
        let mut by_type: HashMap<TypeId, Vec<Indexed>> = HashMap::new();
        let mut all: Vec<Indexed> = Vec::new();
        let len = subscribers.len();

        for (idx, s) in subscribers.into_iter().enumerate() {
            match s.subscribed_to() {
                SubscribedTo::All => all.push((idx, s)),
                SubscribedTo::One(t) => {
                    by_type.entry(t.type_id()).or_default().push((idx, s));
                }
                SubscribedTo::Many(ts) => {
                    let mut seen: Vec<EventType> = Vec::with_capacity(ts.len());
                    for t in ts {
                        // 同一订阅者重复声明同一类型时只投递一次
                        if seen.contains(&t) {
                            continue;
                        }
                        seen.push(t);
                        by_type
                            .entry(t.type_id())
                            .or_default()
                            .push((idx, s.clone()));
                    }
                }
            }
        }

        Self { by_type, all, len }
    }

    /// 解析某事件类型的订阅者，按声明顺序返回
    pub fn matching(&self, event_type: EventType) -> Vec<Arc<dyn DomainEventSubscriber>> {
        let typed = self
            .by_type
            .get(&event_type.type_id())
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut merged: Vec<Arc<dyn DomainEventSubscriber>> =
            Vec::with_capacity(typed.len() + self.all.len());
        let (mut i, mut j) = (0, 0);
        while i < typed.len() || j < self.all.len() {
            let take_typed = match (typed.get(i), self.all.get(j)) {
                (Some(a), Some(b)) => a.0 < b.0,
                (Some(_), None) => true,
                _ => false,
            };
            if take_typed {
                merged.push(typed[i].1.clone());
                i += 1;
            } else {
                merged.push(self.all[j].1.clone());
                j += 1;
            }
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
