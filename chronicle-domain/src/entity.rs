//! 实体（Entity）基础抽象
//!
//! 为聚合提供统一的租户、标识与内部簿记状态（`AggregateState`）访问能力。
//! 通常由 `#[entity]` 宏自动实现。
//!
use crate::aggregate::AggregateState;
use crate::domain_event::DomainEvent;
use chronicle_macros::entity_id;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    fmt::{Debug, Display},
    str::FromStr,
};

/// 租户标识：事件流与快照均按租户隔离
#[entity_id]
pub struct TenantId(String);

/// 具备租户与唯一标识的实体抽象
pub trait Entity: Send + Sync {
    /// 实体标识类型，要求可解析、可显示、可序列化
    type Id: FromStr
        + Clone
        + Display
        + Debug
        + Default
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// 该实体产生的领域事件类型
    type Event: DomainEvent;

    /// 使用给定租户与标识创建空白实体
    fn new(tenant_id: TenantId, id: Self::Id) -> Self;

    fn state(&self) -> &AggregateState<Self::Id, Self::Event>;

    fn state_mut(&mut self) -> &mut AggregateState<Self::Id, Self::Event>;

    /// 获取实体标识
    fn id(&self) -> &Self::Id {
        self.state().id()
    }

    /// 获取所属租户
    fn tenant_id(&self) -> &TenantId {
        self.state().tenant_id()
    }
}
