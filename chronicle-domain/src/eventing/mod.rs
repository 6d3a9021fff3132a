//! 提交后通知（eventing）
//!
//! 保存提交成功后，仓储把本次新增的事件记录作为一个通知任务交给 `NotificationQueue`；
//! `NotificationEngine` 在后台消费队列，按事件类型路由给 `NotificationHandler`：
//! - 至少一次投递，失败按配置延迟重试；
//! - 同一事件的多个处理器有界并发执行；
//! - 在事件之间与重试之间检查取消信号。
//!
//! 重放从不产生通知。
//!
pub mod engine;
pub mod handler;
pub mod queue;

pub use engine::{NotificationEngine, NotificationEngineConfig};
pub use handler::{HandledEventType, NotificationHandler};
pub use queue::{ChannelNotificationQueue, NotificationJob, NotificationQueue};
