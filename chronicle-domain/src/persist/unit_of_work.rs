//! 工作单元（UnitOfWork）
//!
//! 显式事务句柄，持有：
//! - 待追加的事件记录（提交时一次性原子追加）；
//! - 观察者暂存的写入（追加成功后才生效）；
//! - 提交回调（写入生效后依次触发）；
//! - 本事务内的聚合缓存。
//!
//! 参与同一工作单元的仓储必须共享同一个事件日志。
//! 未提交即丢弃等同于回滚：暂存内容与回调全部作废。
//!
use crate::{
    error::{DomainError, DomainResult as Result},
    persist::{AggregateCache, EventLog, EventRecord},
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

type Deferred = Box<dyn FnOnce() + Send>;

pub struct UnitOfWork {
    id: Uuid,
    event_log: Arc<dyn EventLog>,
    records: Vec<EventRecord>,
    writes: Vec<Deferred>,
    callbacks: Vec<Deferred>,
    cache: AggregateCache,
    rollback_only: Option<String>,
}

impl UnitOfWork {
    pub fn new(event_log: Arc<dyn EventLog>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_log,
            records: Vec::new(),
            writes: Vec::new(),
            callbacks: Vec::new(),
            cache: AggregateCache::new(),
            rollback_only: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn staged_records(&self) -> &[EventRecord] {
        &self.records
    }

    pub(crate) fn stage_records(&mut self, records: Vec<EventRecord>) {
        self.records.extend(records);
    }

    /// 暂存一次写入，提交时在事件追加成功后执行
    pub fn stage_write<F>(&mut self, write: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.writes.push(Box::new(write));
    }

    /// 注册提交回调，按注册顺序在提交成功后触发
    pub fn after_commit<F>(&mut self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.callbacks.push(Box::new(callback));
    }

    pub fn cache(&self) -> &AggregateCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AggregateCache {
        &mut self.cache
    }

    /// 标记为只能回滚，之后的提交将被拒绝
    pub fn mark_rollback_only(&mut self, reason: impl Into<String>) {
        if self.rollback_only.is_none() {
            self.rollback_only = Some(reason.into());
        }
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.is_some()
    }

    /// 提交：追加事件，生效暂存写入，然后触发回调
    pub async fn commit(self) -> Result<()> {
        let Self {
            id,
            event_log,
            records,
            writes,
            callbacks,
            rollback_only,
            ..
        } = self;

        if let Some(reason) = rollback_only {
            warn!(unit_of_work = %id, %reason, "unit of work rolled back");
            return Err(DomainError::TransactionAborted { reason });
        }

        if !records.is_empty()
            && let Err(err) = event_log.append(&records).await
        {
            warn!(unit_of_work = %id, error = %err, "unit of work rolled back");
            return Err(err);
        }

        for write in writes {
            write();
        }
        debug!(
            unit_of_work = %id,
            records = records.len(),
            callbacks = callbacks.len(),
            "unit of work committed"
        );
        for callback in callbacks {
            callback();
        }
        Ok(())
    }

    /// 显式回滚：丢弃全部暂存内容
    pub fn rollback(self) {
        debug!(
            unit_of_work = %self.id,
            records = self.records.len(),
            "unit of work discarded"
        );
    }
}
