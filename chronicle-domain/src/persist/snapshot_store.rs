//! 快照存储协议与策略
//!
//! 定义快照读写接口与简单的落盘策略（按序号间隔）。
//! 快照只是加速手段，读取路径在没有快照时回退到全量事件折叠。
//!
use crate::{
    error::DomainResult as Result,
    persist::{SnapshotRecord, StreamKey},
};
use async_trait::async_trait;
use std::sync::Arc;

/// 默认快照间隔（按事件序号）
pub const DEFAULT_SNAPSHOT_INTERVAL: usize = 200;

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 保存快照；同一版本重复保存时覆盖
    async fn save(&self, snapshot: SnapshotRecord) -> Result<()>;

    async fn get_latest(&self, key: &StreamKey) -> Result<Option<SnapshotRecord>>;

    /// 版本不大于 `version` 的最新快照
    async fn get_latest_at_or_before(
        &self,
        key: &StreamKey,
        version: usize,
    ) -> Result<Option<SnapshotRecord>>;

    async fn get_at_version(
        &self,
        key: &StreamKey,
        version: usize,
    ) -> Result<Option<SnapshotRecord>>;

    /// 删除聚合的全部快照历史，返回删除条数
    async fn delete_all(&self, key: &StreamKey) -> Result<usize>;
}

#[async_trait]
impl<T> SnapshotStore for Arc<T>
where
    T: SnapshotStore + ?Sized,
{
    async fn save(&self, snapshot: SnapshotRecord) -> Result<()> {
        (**self).save(snapshot).await
    }

    async fn get_latest(&self, key: &StreamKey) -> Result<Option<SnapshotRecord>> {
        (**self).get_latest(key).await
    }

    async fn get_latest_at_or_before(
        &self,
        key: &StreamKey,
        version: usize,
    ) -> Result<Option<SnapshotRecord>> {
        (**self).get_latest_at_or_before(key, version).await
    }

    async fn get_at_version(
        &self,
        key: &StreamKey,
        version: usize,
    ) -> Result<Option<SnapshotRecord>> {
        (**self).get_at_version(key, version).await
    }

    async fn delete_all(&self, key: &StreamKey) -> Result<usize> {
        (**self).delete_all(key).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotPolicy {
    Never,
    Every(usize),
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        SnapshotPolicy::Every(DEFAULT_SNAPSHOT_INTERVAL)
    }
}

impl SnapshotPolicy {
    pub fn should_snapshot(&self, sequence: usize) -> bool {
        match self {
            SnapshotPolicy::Never => false,
            SnapshotPolicy::Every(interval) => {
                let interval = (*interval).max(1);
                sequence > 0 && sequence.is_multiple_of(interval)
            }
        }
    }

    pub fn interval(&self) -> Option<usize> {
        match self {
            SnapshotPolicy::Never => None,
            SnapshotPolicy::Every(interval) => Some((*interval).max(1)),
        }
    }
}
