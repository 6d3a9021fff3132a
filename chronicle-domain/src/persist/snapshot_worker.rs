//! 快照后台写入
//!
//! 保存路径只把快照交给调度器，不等待落盘；后台任务逐个写入，失败仅记录日志。
//! 关闭时先写完队列中剩余的快照再退出。
//!
use crate::{
    error::{DomainError, DomainResult},
    persist::{SnapshotRecord, SnapshotStore},
    worker::WorkerHandle,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 快照调度器：可廉价克隆，供多个仓储共享
#[derive(Clone)]
pub struct SnapshotScheduler {
    tx: mpsc::UnboundedSender<SnapshotRecord>,
}

impl SnapshotScheduler {
    /// 入队一个快照；后台任务已退出时返回错误
    pub fn schedule(&self, snapshot: SnapshotRecord) -> DomainResult<()> {
        self.tx
            .send(snapshot)
            .map_err(|err| DomainError::SnapshotStore {
                reason: format!("snapshot worker stopped, dropped {}", err.0.stream_key()),
            })
    }
}

pub struct SnapshotWorker;

impl SnapshotWorker {
    /// 启动后台写入任务，返回调度器与运行句柄
    pub fn spawn(store: Arc<dyn SnapshotStore>) -> (SnapshotScheduler, WorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(Self::run(store, rx, token.clone()));

        (SnapshotScheduler { tx }, WorkerHandle::new(token, vec![task]))
    }

    async fn run(
        store: Arc<dyn SnapshotStore>,
        mut rx: mpsc::UnboundedReceiver<SnapshotRecord>,
        token: CancellationToken,
    ) {
        info!("snapshot worker started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                maybe = rx.recv() => match maybe {
                    Some(snapshot) => Self::write(&store, snapshot).await,
                    None => break,
                },
            }
        }

        rx.close();
        while let Some(snapshot) = rx.recv().await {
            Self::write(&store, snapshot).await;
        }
        info!("snapshot worker stopped");
    }

    async fn write(store: &Arc<dyn SnapshotStore>, snapshot: SnapshotRecord) {
        let key = snapshot.stream_key();
        let version = snapshot.version();
        match store.save(snapshot).await {
            Ok(()) => debug!(stream = %key, version, "snapshot saved"),
            Err(err) => warn!(stream = %key, version, error = %err, "snapshot save failed"),
        }
    }
}
