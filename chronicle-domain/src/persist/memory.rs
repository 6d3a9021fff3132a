//! 内存版事件日志与快照存储
//!
//! 用于测试与本地运行；追加在写锁内先整体校验再写入，保证批量原子性。
//!
use crate::{
    error::{DomainError, DomainResult as Result},
    persist::{EventLog, EventRecord, SnapshotRecord, SnapshotStore, StreamKey},
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
pub struct InMemoryEventLog {
    streams: RwLock<HashMap<StreamKey, Vec<EventRecord>>>,
}

impl InMemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 事件流当前记录数
    pub async fn stream_len(&self, key: &StreamKey) -> usize {
        self.streams.read().await.get(key).map_or(0, Vec::len)
    }

    /// 非阻塞读取事件流记录数，锁被占用时返回 None
    pub fn try_stream_len(&self, key: &StreamKey) -> Option<usize> {
        self.streams
            .try_read()
            .ok()
            .map(|streams| streams.get(key).map_or(0, Vec::len))
    }

    /// 全部事件流的记录总数
    pub async fn total_len(&self) -> usize {
        self.streams.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventLog for InMemoryEventLog {
    async fn append(&self, records: &[EventRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut streams = self.streams.write().await;

        // 先校验整批，任一失败则不写入
        let mut next: HashMap<StreamKey, usize> = HashMap::new();
        for record in records {
            let key = record.stream_key();
            let expected = match next.get(&key) {
                Some(n) => *n,
                None => streams.get(&key).map_or(0, Vec::len),
            };
            if record.sequence() < expected {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_type: record.aggregate_type().to_string(),
                    aggregate_id: record.aggregate_id().to_string(),
                    sequence: record.sequence(),
                });
            }
            if record.sequence() > expected {
                return Err(DomainError::event_log(format!(
                    "sequence gap in {key}: expected {expected}, got {}",
                    record.sequence()
                )));
            }
            next.insert(key, expected + 1);
        }

        for record in records {
            streams
                .entry(record.stream_key())
                .or_default()
                .push(record.clone());
        }
        debug!(count = records.len(), "appended event records");
        Ok(())
    }

    async fn read_all(&self, key: &StreamKey) -> Result<Vec<EventRecord>> {
        Ok(self
            .streams
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn read_after(&self, key: &StreamKey, after: usize) -> Result<Vec<EventRecord>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.sequence() > after)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_through(
        &self,
        key: &StreamKey,
        after: Option<usize>,
        through: usize,
    ) -> Result<Vec<EventRecord>> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(key)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| after.is_none_or(|a| r.sequence() > a))
                    .take_while(|r| r.sequence() <= through)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_at(
        &self,
        key: &StreamKey,
        sequence: usize,
        known_min: Option<usize>,
    ) -> Result<Option<EventRecord>> {
        let streams = self.streams.read().await;
        let Some(records) = streams.get(key) else {
            return Ok(None);
        };
        // 序号从 0 连续递增，下标不会超过序号，从提示位置开始扫描
        let start = known_min.unwrap_or(0).min(sequence);
        Ok(records
            .get(start..)
            .and_then(|tail| tail.iter().find(|r| r.sequence() == sequence))
            .cloned())
    }

    async fn delete_all(&self, key: &StreamKey) -> Result<usize> {
        Ok(self
            .streams
            .write()
            .await
            .remove(key)
            .map_or(0, |records| records.len()))
    }
}

#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<HashMap<StreamKey, BTreeMap<usize, SnapshotRecord>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 某聚合已保存的快照版本（升序）
    pub async fn versions(&self, key: &StreamKey) -> Vec<usize> {
        self.snapshots
            .read()
            .await
            .get(key)
            .map(|history| history.keys().copied().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: SnapshotRecord) -> Result<()> {
        let key = snapshot.stream_key();
        let version = snapshot.version();
        self.snapshots
            .write()
            .await
            .entry(key)
            .or_default()
            .insert(version, snapshot);
        Ok(())
    }

    async fn get_latest(&self, key: &StreamKey) -> Result<Option<SnapshotRecord>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(key)
            .and_then(|history| history.values().next_back().cloned()))
    }

    async fn get_latest_at_or_before(
        &self,
        key: &StreamKey,
        version: usize,
    ) -> Result<Option<SnapshotRecord>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(key)
            .and_then(|history| history.range(..=version).next_back())
            .map(|(_, snapshot)| snapshot.clone()))
    }

    async fn get_at_version(
        &self,
        key: &StreamKey,
        version: usize,
    ) -> Result<Option<SnapshotRecord>> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots
            .get(key)
            .and_then(|history| history.get(&version).cloned()))
    }

    async fn delete_all(&self, key: &StreamKey) -> Result<usize> {
        Ok(self
            .snapshots
            .write()
            .await
            .remove(key)
            .map_or(0, |history| history.len()))
    }
}
