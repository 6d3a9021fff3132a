//! 聚合（Aggregate）抽象与簿记状态
//!
//! 聚合通过折叠事件重建状态：
//! - `apply` 将事件投影到状态（确定性、无副作用）；
//! - `record` 应用事件并将其加入待保存队列；
//! - `AggregateState` 记录已持久化事件数、待保存事件、重放标记与一次性保存回调。
//!
use crate::domain_event::DomainEvent;
use crate::entity::{Entity, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt;

/// 尚未持久化的事件及其记录时间
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEvent<E> {
    pub event: E,
    pub occurred_at: DateTime<Utc>,
}

/// 已分配序号的事件（来自事件日志）
#[derive(Debug, Clone, PartialEq)]
pub struct Sequenced<E> {
    pub sequence: usize,
    pub occurred_at: DateTime<Utc>,
    pub event: E,
}

type SavedCallback = Box<dyn FnOnce() + Send + Sync>;

/// 一次性保存回调槽：保存时被取走，提交后触发一次；复制聚合时不携带
#[derive(Default)]
pub struct SavedHook(Option<SavedCallback>);

impl SavedHook {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self(Some(Box::new(callback)))
    }

    pub fn is_armed(&self) -> bool {
        self.0.is_some()
    }

    pub(crate) fn take(&mut self) -> Option<SavedCallback> {
        self.0.take()
    }
}

impl Clone for SavedHook {
    fn clone(&self) -> Self {
        Self(None)
    }
}

impl fmt::Debug for SavedHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SavedHook").field(&self.is_armed()).finish()
    }
}

/// 保存失败时用于恢复聚合的检查点
pub(crate) struct Checkpoint<E> {
    persisted_event_count: usize,
    unsaved: Vec<PendingEvent<E>>,
}

/// 聚合簿记状态，由 `#[entity]` 注入为 `state` 字段
///
/// 快照只序列化租户、标识与已持久化事件数；其余字段为瞬态。
#[derive(Serialize, Deserialize)]
#[serde(bound(serialize = "Id: Serialize", deserialize = "Id: DeserializeOwned"))]
pub struct AggregateState<Id, E> {
    tenant_id: TenantId,
    id: Id,
    persisted_event_count: usize,
    #[serde(skip)]
    unsaved: Vec<PendingEvent<E>>,
    #[serde(skip)]
    being_replayed: bool,
    #[serde(skip)]
    saved: SavedHook,
}

impl<Id, E> AggregateState<Id, E> {
    pub fn new(tenant_id: TenantId, id: Id) -> Self {
        Self {
            tenant_id,
            id,
            persisted_event_count: 0,
            unsaved: Vec::new(),
            being_replayed: false,
            saved: SavedHook::default(),
        }
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    /// 已持久化事件数，即下一个待分配的序号
    pub fn persisted_event_count(&self) -> usize {
        self.persisted_event_count
    }

    pub fn unsaved(&self) -> &[PendingEvent<E>] {
        &self.unsaved
    }

    pub fn is_being_replayed(&self) -> bool {
        self.being_replayed
    }

    pub fn saved_hook(&self) -> &SavedHook {
        &self.saved
    }

    pub(crate) fn set_tenant_id(&mut self, tenant_id: TenantId) {
        self.tenant_id = tenant_id;
    }

    pub(crate) fn set_being_replayed(&mut self, value: bool) {
        self.being_replayed = value;
    }

    pub(crate) fn arm_saved(&mut self, callback: SavedCallback) {
        self.saved = SavedHook(Some(callback));
    }

    pub(crate) fn take_saved(&mut self) -> Option<SavedCallback> {
        self.saved.take()
    }

    fn push_pending(&mut self, pending: PendingEvent<E>) {
        self.unsaved.push(pending);
    }

    fn mark_folded(&mut self, sequence: usize) {
        self.persisted_event_count = self.persisted_event_count.max(sequence + 1);
    }

    /// 标记所有待保存事件已分配序号
    pub(crate) fn mark_persisted(&mut self, next_sequence: usize) {
        self.persisted_event_count = next_sequence;
        self.unsaved.clear();
    }
}

impl<Id, E: Clone> AggregateState<Id, E> {
    pub(crate) fn checkpoint(&self) -> Checkpoint<E> {
        Checkpoint {
            persisted_event_count: self.persisted_event_count,
            unsaved: self.unsaved.clone(),
        }
    }

    pub(crate) fn restore(&mut self, checkpoint: Checkpoint<E>) {
        self.persisted_event_count = checkpoint.persisted_event_count;
        self.unsaved = checkpoint.unsaved;
    }
}

impl<Id: Default, E> Default for AggregateState<Id, E> {
    fn default() -> Self {
        Self::new(TenantId::default(), Id::default())
    }
}

impl<Id: Clone, E: Clone> Clone for AggregateState<Id, E> {
    fn clone(&self) -> Self {
        Self {
            tenant_id: self.tenant_id.clone(),
            id: self.id.clone(),
            persisted_event_count: self.persisted_event_count,
            unsaved: self.unsaved.clone(),
            being_replayed: self.being_replayed,
            saved: self.saved.clone(),
        }
    }
}

impl<Id: fmt::Debug, E: fmt::Debug> fmt::Debug for AggregateState<Id, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateState")
            .field("tenant_id", &self.tenant_id)
            .field("id", &self.id)
            .field("persisted_event_count", &self.persisted_event_count)
            .field("unsaved", &self.unsaved)
            .field("being_replayed", &self.being_replayed)
            .field("saved", &self.saved)
            .finish()
    }
}

/// 聚合根接口
pub trait Aggregate: Entity + Clone + Serialize + DeserializeOwned + 'static {
    /// 聚合类型名，持久化时作为流键的一部分
    const TYPE: &'static str;

    /// 应用事件，更新聚合状态
    fn apply(&mut self, event: &Self::Event);

    /// 全量重放前剔除被后续事件撤销的事件，默认原样返回
    fn remaining_events_after_rollback(
        events: Vec<Sequenced<Self::Event>>,
    ) -> Vec<Sequenced<Self::Event>> {
        events
    }

    /// 应用事件并记为待保存（记录时间取当前时间）
    fn record(&mut self, event: Self::Event) {
        self.record_at(event, Utc::now());
    }

    /// 应用事件并记为待保存，使用给定的记录时间
    fn record_at(&mut self, event: Self::Event, occurred_at: DateTime<Utc>) {
        self.apply(&event);
        self.state_mut().push_pending(PendingEvent { event, occurred_at });
    }

    /// 由已提交事件构造聚合
    fn from_events<I>(tenant_id: TenantId, id: Self::Id, events: I) -> Self
    where
        I: IntoIterator<Item = Sequenced<Self::Event>>,
    {
        let mut aggregate = Self::new(tenant_id, id);
        for sequenced in events {
            aggregate.apply(&sequenced.event);
            aggregate.state_mut().mark_folded(sequenced.sequence);
        }
        aggregate
    }

    /// 在快照状态上应用序号大于 `from_version` 的事件
    fn apply_events_after_snapshot<I>(&mut self, events: I, from_version: usize)
    where
        I: IntoIterator<Item = Sequenced<Self::Event>>,
    {
        self.state_mut().mark_folded(from_version);
        for sequenced in events {
            if sequenced.sequence <= from_version {
                continue;
            }
            self.apply(&sequenced.event);
            self.state_mut().mark_folded(sequenced.sequence);
        }
    }

    fn persisted_event_count(&self) -> usize {
        self.state().persisted_event_count()
    }

    fn unsaved_events(&self) -> &[PendingEvent<Self::Event>] {
        self.state().unsaved()
    }

    fn is_being_replayed(&self) -> bool {
        self.state().is_being_replayed()
    }

    fn set_being_replayed(&mut self, value: bool) {
        self.state_mut().set_being_replayed(value);
    }

    /// 设置一次性保存回调：下一次保存提交后触发，之后需重新设置
    fn on_saved<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.state_mut().arm_saved(Box::new(callback));
    }
}
