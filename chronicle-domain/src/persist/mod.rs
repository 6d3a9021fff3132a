//! 持久化与事件溯源（persist）
//!
//! 定义事件日志、快照存储及其通用组合实现，支持：
//! - 事件按流追加与按序号查询（`EventLog`），乐观并发检测；
//! - 快照读写与策略（`SnapshotStore`/`SnapshotPolicy`），快照在后台写入（`SnapshotWorker`）；
//! - 显式工作单元（`UnitOfWork`）与事务内聚合缓存（`AggregateCache`）；
//! - 观察者同步分发（`ObserverDispatcher`）；
//! - 聚合仓储的加载、保存、删除与重放（`EventSourcedRepository`）。
//!
//! 该模块聚焦协议与装配逻辑，附带内存实现；持久化后端由上层实现 `EventLog`/`SnapshotStore` 注入。
//!
mod aggregate_repository;
mod cache;
mod event_log;
mod event_record;
mod memory;
mod observer;
mod replay;
mod snapshot_record;
mod snapshot_store;
mod snapshot_worker;
mod unit_of_work;

pub use aggregate_repository::{AggregateRepository, EventSourcedRepository};
pub use cache::AggregateCache;
pub use event_log::EventLog;
pub use event_record::{EventRecord, StreamKey, decode_records};
pub use memory::{InMemoryEventLog, InMemorySnapshotStore};
pub use observer::{Observer, ObserverDispatcher, ObserverSelection};
pub use replay::ReplayOptions;
pub use snapshot_record::SnapshotRecord;
pub use snapshot_store::{DEFAULT_SNAPSHOT_INTERVAL, SnapshotPolicy, SnapshotStore};
pub use snapshot_worker::{SnapshotScheduler, SnapshotWorker};
pub use unit_of_work::UnitOfWork;
