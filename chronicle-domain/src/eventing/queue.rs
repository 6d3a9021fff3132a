//! 通知队列
//!
//! 仓储只在工作单元提交后入队，入队本身是同步且不阻塞的。
//!
use crate::{
    error::{DomainError, DomainResult},
    persist::EventRecord,
};
use tokio::sync::mpsc;

/// 一次保存提交产生的事件记录
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationJob {
    records: Vec<EventRecord>,
}

impl NotificationJob {
    pub fn new(records: Vec<EventRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[EventRecord] {
        &self.records
    }
}

/// 后台任务调度协议（至少一次）
pub trait NotificationQueue: Send + Sync {
    fn enqueue(&self, job: NotificationJob) -> DomainResult<()>;
}

/// 基于 tokio 通道的队列，由 `NotificationEngine::start` 创建
#[derive(Clone)]
pub struct ChannelNotificationQueue {
    tx: mpsc::UnboundedSender<NotificationJob>,
}

impl ChannelNotificationQueue {
    pub(crate) fn new(tx: mpsc::UnboundedSender<NotificationJob>) -> Self {
        Self { tx }
    }
}

impl NotificationQueue for ChannelNotificationQueue {
    fn enqueue(&self, job: NotificationJob) -> DomainResult<()> {
        self.tx.send(job).map_err(|err| DomainError::Notification {
            reason: format!(
                "notification engine stopped, dropped {} records",
                err.0.records().len()
            ),
        })
    }
}
