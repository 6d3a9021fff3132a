//! 领域事件（DomainEvent）约束
//!
//! 事件载荷以 JSON 持久化，类型判别符用于反序列化与通知路由。
//!
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;

/// 领域事件载荷需要满足的通用能力边界
pub trait DomainEvent:
    Clone + PartialEq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 事件类型（形如 `AccountEvent.Deposited` 或自定义类型名）
    fn event_type(&self) -> &'static str;

    /// 事件载荷版本
    fn event_version(&self) -> usize;
}
