//! 通知引擎（NotificationEngine）
//!
//! 长驻任务：消费通知队列，按处理器匹配分发并发执行，失败按配置重试。
//! 取消信号在每个事件之前与每次重试之前检查；取消后剩余任务不再处理。
//!
use super::handler::HandledEventType;
use super::{ChannelNotificationQueue, NotificationHandler, NotificationJob};
use crate::{persist::EventRecord, worker::WorkerHandle};
use bon::Builder;
use futures_util::{StreamExt, stream};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// 导入由 bon::Builder 生成的 typestate 模块与状态转换别名
use self::notification_engine_builder::{IsUnset, SetRegistry, State as BuilderState};

#[derive(Builder)]
pub struct NotificationEngine {
    #[builder(setters(vis = "pub(crate)"))]
    registry: HandlerRegistry,
    #[builder(default)]
    config: NotificationEngineConfig,
}

impl<S: BuilderState> NotificationEngineBuilder<S> {
    pub fn handlers(
        self,
        handlers: Vec<Arc<dyn NotificationHandler>>,
    ) -> NotificationEngineBuilder<SetRegistry<S>>
    where
        <S as BuilderState>::Registry: IsUnset,
    {
        self.registry(HandlerRegistry::new(handlers))
    }
}

impl NotificationEngine {
    /// 启动引擎，返回入队端与运行句柄
    pub fn start(self: Arc<Self>) -> (ChannelNotificationQueue, WorkerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let task = tokio::spawn(Self::consume_loop(self, rx, token.clone()));

        (
            ChannelNotificationQueue::new(tx),
            WorkerHandle::new(token, vec![task]),
        )
    }

    async fn consume_loop(
        self: Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<NotificationJob>,
        token: CancellationToken,
    ) {
        info!("notification engine started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                maybe_job = rx.recv() => match maybe_job {
                    Some(job) => self.process(job, &token).await,
                    None => break,
                },
            }
        }
        info!("notification engine stopped");
    }

    /// 逐条处理任务中的事件记录
    pub(crate) async fn process(&self, job: NotificationJob, token: &CancellationToken) {
        for record in job.records() {
            if token.is_cancelled() {
                return;
            }

            let matched = self.registry.matching(record.event_type());
            if matched.is_empty() {
                continue;
            }

            stream::iter(matched)
                .for_each_concurrent(Some(self.config.handler_concurrency), move |h| async move {
                    self.deliver(h.as_ref(), record, token).await;
                })
                .await;
        }
    }

    async fn deliver(
        &self,
        handler: &dyn NotificationHandler,
        record: &EventRecord,
        token: &CancellationToken,
    ) {
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if token.is_cancelled() {
                return;
            }

            let err = match handler.handle(record).await {
                Ok(()) => return,
                Err(err) => err,
            };

            if attempt == max_attempts {
                error!(
                    handler = handler.handler_name(),
                    stream = %record.stream_key(),
                    sequence = record.sequence(),
                    attempts = attempt,
                    error = %err,
                    "notification dropped"
                );
                return;
            }

            warn!(
                handler = handler.handler_name(),
                stream = %record.stream_key(),
                sequence = record.sequence(),
                attempt,
                error = %err,
                "notification failed, retrying"
            );
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(self.config.retry_delay) => {}
            }
        }
    }
}

#[derive(Clone, Default)]
struct HandlerRegistry {
    by_type: HashMap<String, Vec<Arc<dyn NotificationHandler>>>,
    all: Vec<Arc<dyn NotificationHandler>>,
}

impl HandlerRegistry {
    fn new(handlers: Vec<Arc<dyn NotificationHandler>>) -> Self {
        let mut by_type: HashMap<String, Vec<Arc<dyn NotificationHandler>>> = HashMap::new();
        let mut all: Vec<Arc<dyn NotificationHandler>> = Vec::new();

        for h in handlers {
            match h.handled_event_type() {
                HandledEventType::All => all.push(h),
                HandledEventType::One(t) => {
                    by_type.entry(t).or_default().push(h);
                }
                HandledEventType::Many(ts) => {
                    for t in ts {
                        by_type.entry(t).or_default().push(h.clone());
                    }
                }
            }
        }

        Self { by_type, all }
    }

    fn matching(&self, event_type: &str) -> Vec<Arc<dyn NotificationHandler>> {
        let mut merged: Vec<Arc<dyn NotificationHandler>> = Vec::new();
        if let Some(list) = self.by_type.get(event_type) {
            merged.extend(list.iter().cloned());
        }
        merged.extend(self.all.iter().cloned());
        merged
    }
}

/// 通知引擎配置
#[derive(Clone, Copy, Debug)]
pub struct NotificationEngineConfig {
    /// 单事件的处理并发（同一事件广播给多个 handler）
    pub handler_concurrency: usize,
    /// 每个 handler 的最大尝试次数
    pub max_attempts: usize,
    /// 重试间隔
    pub retry_delay: Duration,
}

impl Default for NotificationEngineConfig {
    fn default() -> Self {
        Self {
            handler_concurrency: 8,
            max_attempts: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}
