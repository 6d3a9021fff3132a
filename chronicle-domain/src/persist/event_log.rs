//! 事件日志协议
//!
//! 按事件流追加写入、按序号读取。追加为原子批量操作：
//! 任一记录的序号已被占用时整批失败并返回并发冲突，存储层从不重试。
//!
use crate::{
    error::DomainResult as Result,
    persist::{EventRecord, StreamKey},
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait EventLog: Send + Sync {
    /// 原子追加一批记录（可跨多个事件流）
    async fn append(&self, records: &[EventRecord]) -> Result<()>;

    /// 读取事件流的全部记录（按序号升序）
    async fn read_all(&self, key: &StreamKey) -> Result<Vec<EventRecord>>;

    /// 读取序号大于 `after` 的记录
    async fn read_after(&self, key: &StreamKey, after: usize) -> Result<Vec<EventRecord>>;

    /// 读取 `after < sequence <= through` 的记录；`after` 为空时从 0 开始
    async fn read_through(
        &self,
        key: &StreamKey,
        after: Option<usize>,
        through: usize,
    ) -> Result<Vec<EventRecord>>;

    /// 读取指定序号的单条记录；`known_min` 为已知存在的最小序号提示
    async fn read_at(
        &self,
        key: &StreamKey,
        sequence: usize,
        known_min: Option<usize>,
    ) -> Result<Option<EventRecord>>;

    /// 删除事件流的全部记录，返回删除条数
    async fn delete_all(&self, key: &StreamKey) -> Result<usize>;
}

#[async_trait]
impl<T> EventLog for Arc<T>
where
    T: EventLog + ?Sized,
{
    async fn append(&self, records: &[EventRecord]) -> Result<()> {
        (**self).append(records).await
    }

    async fn read_all(&self, key: &StreamKey) -> Result<Vec<EventRecord>> {
        (**self).read_all(key).await
    }

    async fn read_after(&self, key: &StreamKey, after: usize) -> Result<Vec<EventRecord>> {
        (**self).read_after(key, after).await
    }

    async fn read_through(
        &self,
        key: &StreamKey,
        after: Option<usize>,
        through: usize,
    ) -> Result<Vec<EventRecord>> {
        (**self).read_through(key, after, through).await
    }

    async fn read_at(
        &self,
        key: &StreamKey,
        sequence: usize,
        known_min: Option<usize>,
    ) -> Result<Option<EventRecord>> {
        (**self).read_at(key, sequence, known_min).await
    }

    async fn delete_all(&self, key: &StreamKey) -> Result<usize> {
        (**self).delete_all(key).await
    }
}
