//! 事件重放
//!
//! 重放只重新分发已提交的事件给观察者（用于重建投影），从不重新追加事件，也不发送通知。
//! - 单事件重放：按该序号时的状态（可用快照）分发一次；
//! - 全量/按类型重放：忽略快照，从头折叠后按序分发。
//!
use crate::{
    aggregate::{Aggregate, SavedHook, Sequenced},
    domain_event::DomainEvent,
    entity::{Entity, TenantId},
    error::{DomainError, DomainResult as Result},
    persist::{
        AggregateRepository, EventSourcedRepository, ObserverSelection, StreamKey, UnitOfWork,
        decode_records,
    },
};
use bon::Builder;
use tracing::info;

/// 重放选项
#[derive(Debug, Clone, Default, Builder)]
pub struct ReplayOptions {
    /// 参与重放的观察者
    #[builder(default)]
    pub observers: ObserverSelection,
    /// 改写聚合所属租户（用于把历史投影到另一租户）
    pub tenant_override: Option<TenantId>,
    /// 重放提交后触发一次的回调；复制选项时不携带
    #[builder(skip)]
    pub saved: SavedHook,
}

impl ReplayOptions {
    /// 设置重放提交后的一次性回调，分发失败时不会触发
    pub fn on_saved<F>(mut self, callback: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.saved = SavedHook::new(callback);
        self
    }
}

impl<A: Aggregate> EventSourcedRepository<A> {
    pub(crate) async fn replay_one(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        sequence: usize,
        mut options: ReplayOptions,
    ) -> Result<A> {
        let key = StreamKey::of::<A>(tenant_id, id);
        let record = self
            .event_log
            .read_at(&key, sequence, None)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("event {sequence} of {key}")))?;
        let replayed = record.decode::<A>()?;

        let mut aggregate = self
            .load_at(tenant_id, id, sequence)
            .await?
            .ok_or_else(|| DomainError::not_found(key.to_string()))?;
        if let Some(callback) = options.saved.take() {
            aggregate.state_mut().arm_saved(callback);
        }
        if let Some(tenant) = options.tenant_override {
            aggregate.state_mut().set_tenant_id(tenant);
        }

        aggregate.set_being_replayed(true);
        let mut uow = self.begin();
        let outcome = self
            .dispatch_replayed(&mut uow, &aggregate, [&replayed], &options.observers)
            .await;
        let outcome = match outcome {
            Ok(()) => {
                if let Some(hook) = aggregate.state_mut().take_saved() {
                    uow.after_commit(hook);
                }
                uow.commit().await
            }
            Err(err) => {
                uow.rollback();
                Err(err)
            }
        };
        aggregate.set_being_replayed(false);
        outcome?;

        info!(stream = %key, sequence, "event replayed");
        Ok(aggregate)
    }

    pub(crate) async fn replay_stream(
        &self,
        tenant_id: &TenantId,
        id: &A::Id,
        event_types: Option<&[&str]>,
        mut options: ReplayOptions,
    ) -> Result<usize> {
        let key = StreamKey::of::<A>(tenant_id, id);
        let records = self.event_log.read_all(&key).await?;
        if records.is_empty() {
            return Ok(0);
        }

        let events = decode_records::<A>(&records)?;
        let mut aggregate = A::from_events(tenant_id.clone(), id.clone(), events.clone());

        let selected: Vec<Sequenced<A::Event>> = match event_types {
            None => A::remaining_events_after_rollback(events),
            Some(types) => events
                .into_iter()
                .filter(|e| types.contains(&e.event.event_type()))
                .collect(),
        };
        if selected.is_empty() {
            return Ok(0);
        }

        if let Some(tenant) = options.tenant_override {
            aggregate.state_mut().set_tenant_id(tenant);
        }

        aggregate.set_being_replayed(true);
        let mut uow = self.begin();
        let outcome = self
            .dispatch_replayed(&mut uow, &aggregate, selected.iter(), &options.observers)
            .await;
        let outcome = match outcome {
            Ok(()) => {
                if let Some(hook) = options.saved.take() {
                    uow.after_commit(hook);
                }
                uow.commit().await
            }
            Err(err) => {
                uow.rollback();
                Err(err)
            }
        };
        aggregate.set_being_replayed(false);
        outcome?;

        info!(stream = %key, count = selected.len(), "events replayed");
        Ok(selected.len())
    }

    async fn dispatch_replayed<'a, I>(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &A,
        events: I,
        selection: &ObserverSelection,
    ) -> Result<()>
    where
        I: IntoIterator<Item = &'a Sequenced<A::Event>>,
        I::IntoIter: Send,
        A::Event: 'a,
    {
        for replayed in events {
            self.observers
                .dispatch(uow, aggregate, &replayed.event, replayed.sequence, selection)
                .await?;
        }
        Ok(())
    }
}
