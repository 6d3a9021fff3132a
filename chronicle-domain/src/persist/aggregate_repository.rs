//! 聚合仓储
//!
//! 基于事件日志（可选快照）的通用聚合仓储实现：
//! - 加载：工作单元缓存 → 最新快照 → 快照之后的事件 → 折叠；
//! - 保存：分配序号、同步分发观察者、暂存记录，提交后触发快照、保存回调与通知；
//! - 重放：见 `replay` 模块。
//!
use crate::{
    aggregate::Aggregate,
    entity::{Entity, TenantId},
    error::DomainResult as Result,
    eventing::{NotificationJob, NotificationQueue},
    persist::{
        EventLog, EventRecord, Observer, ObserverDispatcher, ObserverSelection, ReplayOptions,
        SnapshotPolicy, SnapshotRecord, SnapshotScheduler, SnapshotStore, StreamKey,
        UnitOfWork, decode_records,
    },
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

#[async_trait]
pub trait AggregateRepository<A>: Send + Sync
where
    A: Aggregate,
{
    /// 开启一个使用本仓储事件日志的工作单元
    fn begin(&self) -> UnitOfWork;

    async fn get_by_id(&self, tenant_id: &TenantId, id: &A::Id) -> Result<Option<A>>;

    /// 在工作单元内加载，命中缓存时直接返回副本
    async fn get_by_id_in(
        &self,
        uow: &mut UnitOfWork,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<A>>;

    /// 加载序号 `sequence`（含）时的状态
    async fn get_by_id_at_sequence_number(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
    ) -> Result<Option<A>>;

    /// 忽略快照，从序号 0 全量折叠
    async fn get_by_id_without_snapshot(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<A>>;

    /// 在独立工作单元中保存并提交
    async fn save(&self, aggregate: &mut A) -> Result<()>;

    /// 加入调用方的工作单元保存，不提交
    async fn save_in(&self, uow: &mut UnitOfWork, aggregate: &mut A) -> Result<()>;

    /// 删除事件流及快照历史，返回删除的事件条数
    async fn delete_by_id(&self, tenant_id: &TenantId, id: &A::Id) -> Result<usize>;

    /// 重放单个事件，返回重放时的聚合状态
    async fn replay_event_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
        options: ReplayOptions,
    ) -> Result<A>;

    /// 重放全部事件（剔除被撤销的事件），返回分发的事件数
    async fn replay_all_events_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        options: ReplayOptions,
    ) -> Result<usize>;

    /// 仅重放指定类型的事件，返回分发的事件数
    async fn replay_events_of_type_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        event_types: &[&str],
        options: ReplayOptions,
    ) -> Result<usize>;

    /// 快照间隔；未配置快照时为 None
    fn snapshot_save_interval(&self) -> Option<usize>;
}

#[async_trait]
impl<A, T> AggregateRepository<A> for Arc<T>
where
    A: Aggregate,
    T: AggregateRepository<A> + ?Sized,
{
    fn begin(&self) -> UnitOfWork {
        (**self).begin()
    }

    async fn get_by_id(&self, tenant_id: &TenantId, id: &A::Id) -> Result<Option<A>> {
        (**self).get_by_id(tenant_id, id).await
    }

    async fn get_by_id_in(
        &self,
        uow: &mut UnitOfWork,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<A>> {
        (**self).get_by_id_in(uow, tenant_id, id).await
    }

    async fn get_by_id_at_sequence_number(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
    ) -> Result<Option<A>> {
        (**self)
            .get_by_id_at_sequence_number(tenant_id, id, sequence)
            .await
    }

    async fn get_by_id_without_snapshot(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<A>> {
        (**self).get_by_id_without_snapshot(tenant_id, id).await
    }

    async fn save(&self, aggregate: &mut A) -> Result<()> {
        (**self).save(aggregate).await
    }

    async fn save_in(&self, uow: &mut UnitOfWork, aggregate: &mut A) -> Result<()> {
        (**self).save_in(uow, aggregate).await
    }

    async fn delete_by_id(&self, tenant_id: &TenantId, id: &A::Id) -> Result<usize> {
        (**self).delete_by_id(tenant_id, id).await
    }

    async fn replay_event_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
        options: ReplayOptions,
    ) -> Result<A> {
        (**self)
            .replay_event_by_aggregate_id(tenant_id, id, sequence, options)
            .await
    }

    async fn replay_all_events_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        options: ReplayOptions,
    ) -> Result<usize> {
        (**self)
            .replay_all_events_by_aggregate_id(tenant_id, id, options)
            .await
    }

    async fn replay_events_of_type_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        event_types: &[&str],
        options: ReplayOptions,
    ) -> Result<usize> {
        (**self)
            .replay_events_of_type_by_aggregate_id(tenant_id, id, event_types, options)
            .await
    }

    fn snapshot_save_interval(&self) -> Option<usize> {
        (**self).snapshot_save_interval()
    }
}

pub(crate) struct SnapshotBinding {
    pub(crate) store: Arc<dyn SnapshotStore>,
    pub(crate) scheduler: SnapshotScheduler,
    pub(crate) policy: SnapshotPolicy,
}

/// 基于事件日志 + 可选快照的通用聚合仓储实现。
/// - 每个聚合类型一个实例，启动时显式组装观察者
/// - 仅在配置了 `SnapshotPolicy::Every` 时读写快照
pub struct EventSourcedRepository<A: Aggregate> {
    pub(crate) event_log: Arc<dyn EventLog>,
    pub(crate) snapshots: Option<SnapshotBinding>,
    pub(crate) observers: ObserverDispatcher<A>,
    notifications: Option<Arc<dyn NotificationQueue>>,
}

impl<A: Aggregate> EventSourcedRepository<A> {
    pub fn new(event_log: Arc<dyn EventLog>) -> Self {
        Self {
            event_log,
            snapshots: None,
            observers: ObserverDispatcher::default(),
            notifications: None,
        }
    }

    pub fn with_snapshots(
        mut self,
        store: Arc<dyn SnapshotStore>,
        scheduler: SnapshotScheduler,
        policy: SnapshotPolicy,
    ) -> Self {
        self.snapshots = Some(SnapshotBinding {
            store,
            scheduler,
            policy,
        });
        self
    }

    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observer<A>>>) -> Self {
        self.observers = ObserverDispatcher::new(observers);
        self
    }

    pub fn with_notifications(mut self, queue: Arc<dyn NotificationQueue>) -> Self {
        self.notifications = Some(queue);
        self
    }

    /// 启用快照的绑定（策略为 `Never` 时视为未启用）
    pub(crate) fn snapshot_binding(&self) -> Option<&SnapshotBinding> {
        self.snapshots
            .as_ref()
            .filter(|binding| binding.policy.interval().is_some())
    }

    /// 最新快照 + 其后事件；`use_snapshot` 为 false 时全量折叠
    pub(crate) async fn load(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        use_snapshot: bool,
    ) -> Result<Option<A>> {
        let key = StreamKey::of::<A>(tenant_id, id);

        let snapshot = match self.snapshot_binding() {
            Some(binding) if use_snapshot => binding.store.get_latest(&key).await?,
            _ => None,
        };

        if let Some(snapshot) = snapshot
            && let Some(mut aggregate) = restore_snapshot::<A>(&key, &snapshot)
        {
            let records = self.event_log.read_after(&key, snapshot.version()).await?;
            aggregate
                .apply_events_after_snapshot(decode_records::<A>(&records)?, snapshot.version());
            debug!(
                stream = %key,
                snapshot_version = snapshot.version(),
                trailing = records.len(),
                "aggregate loaded from snapshot"
            );
            return Ok(Some(aggregate));
        }

        let records = self.event_log.read_all(&key).await?;
        if records.is_empty() {
            return Ok(None);
        }
        let events = decode_records::<A>(&records)?;
        let aggregate = A::from_events(tenant_id.clone(), id.clone(), events);
        debug!(stream = %key, events = records.len(), "aggregate loaded from events");
        Ok(Some(aggregate))
    }

    /// 加载序号 `sequence`（含）时的状态，快照取不晚于该序号的最新一份
    pub(crate) async fn load_at(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
    ) -> Result<Option<A>> {
        let key = StreamKey::of::<A>(tenant_id, id);

        let snapshot = match self.snapshot_binding() {
            Some(binding) => binding.store.get_latest_at_or_before(&key, sequence).await?,
            None => None,
        };
        let baseline = snapshot.and_then(|snapshot| {
            restore_snapshot::<A>(&key, &snapshot).map(|aggregate| (snapshot.version(), aggregate))
        });

        let after = baseline.as_ref().map(|(version, _)| *version);
        let records = self.event_log.read_through(&key, after, sequence).await?;
        let events = decode_records::<A>(&records)?;

        match baseline {
            Some((version, mut aggregate)) => {
                aggregate.apply_events_after_snapshot(events, version);
                Ok(Some(aggregate))
            }
            None if events.is_empty() => Ok(None),
            None => Ok(Some(A::from_events(tenant_id.clone(), id.clone(), events))),
        }
    }

    /// 将聚合的待保存事件写入工作单元
    async fn apply_changes_to_transaction(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &mut A,
    ) -> Result<()> {
        let start = aggregate.persisted_event_count();
        let pending = aggregate.unsaved_events().to_vec();

        let mut sequence = start;
        let mut records = Vec::with_capacity(pending.len());
        for event in &pending {
            self.observers
                .dispatch(uow, aggregate, &event.event, sequence, &ObserverSelection::All)
                .await?;
            records.push(EventRecord::from_pending(&*aggregate, event, sequence)?);
            sequence += 1;
        }

        let snapshot_due = self
            .snapshot_binding()
            .filter(|binding| (start..sequence).any(|s| binding.policy.should_snapshot(s)));

        uow.stage_records(records.clone());
        aggregate.state_mut().mark_persisted(sequence);

        // 快照只是加速手段，序列化失败不影响本次保存
        if let Some(binding) = snapshot_due {
            match SnapshotRecord::from_aggregate(&*aggregate, sequence - 1) {
                Ok(snapshot) => {
                    let scheduler = binding.scheduler.clone();
                    uow.after_commit(move || {
                        if let Err(err) = scheduler.schedule(snapshot) {
                            warn!(error = %err, "snapshot not scheduled");
                        }
                    });
                }
                Err(err) => warn!(
                    aggregate_type = A::TYPE,
                    version = sequence - 1,
                    error = %err,
                    "snapshot skipped"
                ),
            }
        }

        uow.cache_mut().upsert(&*aggregate);

        if let Some(hook) = aggregate.state_mut().take_saved() {
            uow.after_commit(hook);
        }

        if let Some(queue) = self.notifications.clone()
            && !records.is_empty()
        {
            let job = NotificationJob::new(records);
            uow.after_commit(move || {
                if let Err(err) = queue.enqueue(job) {
                    warn!(error = %err, "notification not enqueued");
                }
            });
        }

        debug!(
            aggregate_type = A::TYPE,
            aggregate_id = %aggregate.id(),
            from = start,
            to = sequence,
            "aggregate changes staged"
        );
        Ok(())
    }
}

#[async_trait]
impl<A> AggregateRepository<A> for EventSourcedRepository<A>
where
    A: Aggregate,
{
    fn begin(&self) -> UnitOfWork {
        UnitOfWork::new(self.event_log.clone())
    }

    async fn get_by_id(&self, tenant_id: &TenantId, id: &A::Id) -> Result<Option<A>> {
        self.load(tenant_id, id, true).await
    }

    async fn get_by_id_in(
        &self,
        uow: &mut UnitOfWork,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<A>> {
        if let Some(cached) = uow.cache().get::<A>(tenant_id, id) {
            return Ok(Some(cached));
        }

        let loaded = self.load(tenant_id, id, true).await?;
        if let Some(aggregate) = &loaded {
            uow.cache_mut().upsert(aggregate);
        }
        Ok(loaded)
    }

    async fn get_by_id_at_sequence_number(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
    ) -> Result<Option<A>> {
        self.load_at(tenant_id, id, sequence).await
    }

    async fn get_by_id_without_snapshot(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
    ) -> Result<Option<A>> {
        self.load(tenant_id, id, false).await
    }

    async fn save(&self, aggregate: &mut A) -> Result<()> {
        let mut uow = self.begin();
        let checkpoint = aggregate.state().checkpoint();

        if let Err(err) = self.apply_changes_to_transaction(&mut uow, aggregate).await {
            aggregate.state_mut().restore(checkpoint);
            uow.rollback();
            return Err(err);
        }

        if let Err(err) = uow.commit().await {
            aggregate.state_mut().restore(checkpoint);
            return Err(err);
        }
        Ok(())
    }

    async fn save_in(&self, uow: &mut UnitOfWork, aggregate: &mut A) -> Result<()> {
        let checkpoint = aggregate.state().checkpoint();

        if let Err(err) = self.apply_changes_to_transaction(uow, aggregate).await {
            aggregate.state_mut().restore(checkpoint);
            uow.mark_rollback_only(err.to_string());
            return Err(err);
        }
        Ok(())
    }

    async fn delete_by_id(&self, tenant_id: &TenantId, id: &A::Id) -> Result<usize> {
        let key = StreamKey::of::<A>(tenant_id, id);
        let removed = self.event_log.delete_all(&key).await?;
        if let Some(binding) = &self.snapshots {
            binding.store.delete_all(&key).await?;
        }
        debug!(stream = %key, removed, "aggregate deleted");
        Ok(removed)
    }

    async fn replay_event_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
        options: ReplayOptions,
    ) -> Result<A> {
        self.replay_one(tenant_id, id, sequence, options).await
    }

    async fn replay_all_events_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        options: ReplayOptions,
    ) -> Result<usize> {
        self.replay_stream(tenant_id, id, None, options).await
    }

    async fn replay_events_of_type_by_aggregate_id(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        event_types: &[&str],
        options: ReplayOptions,
    ) -> Result<usize> {
        self.replay_stream(tenant_id, id, Some(event_types), options)
            .await
    }

    fn snapshot_save_interval(&self) -> Option<usize> {
        self.snapshot_binding()
            .and_then(|binding| binding.policy.interval())
    }
}

/// 还原快照；无法还原时记录告警并返回 `None`，由调用方退回全量折叠
fn restore_snapshot<A: Aggregate>(key: &StreamKey, snapshot: &SnapshotRecord) -> Option<A> {
    match snapshot.to_aggregate::<A>() {
        Ok(aggregate) => Some(aggregate),
        Err(err) => {
            warn!(
                stream = %key,
                snapshot_version = snapshot.version(),
                error = %err,
                "snapshot unusable, folding from events"
            );
            None
        }
    }
}
