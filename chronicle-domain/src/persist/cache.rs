//! 工作单元内的聚合缓存（identity map）
//!
//! 以事件流键索引，存放聚合状态的副本；读取时按聚合类型向下转型。
//!
use crate::{aggregate::Aggregate, entity::TenantId, persist::StreamKey};
use std::any::Any;
use std::collections::HashMap;

#[derive(Default)]
pub struct AggregateCache {
    entries: HashMap<StreamKey, Box<dyn Any + Send + Sync>>,
}

impl AggregateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取缓存聚合的副本
    pub fn get<A: Aggregate>(&self, tenant_id: &TenantId, id: &A::Id) -> Option<A> {
        self.entries
            .get(&StreamKey::of::<A>(tenant_id, id))
            .and_then(|entry| entry.downcast_ref::<A>())
            .cloned()
    }

    /// 写入或替换缓存条目
    pub fn upsert<A: Aggregate>(&mut self, aggregate: &A) {
        self.entries
            .insert(StreamKey::for_aggregate(aggregate), Box::new(aggregate.clone()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
