//! 事件持久化模型（EventRecord）与事件流键（StreamKey）
//!
use crate::{
    aggregate::{Aggregate, PendingEvent, Sequenced},
    domain_event::DomainEvent,
    entity::{Entity, TenantId},
    error::{DomainError, DomainResult},
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// 事件流键：(租户, 聚合类型, 聚合标识)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    tenant_id: TenantId,
    aggregate_type: String,
    aggregate_id: String,
}

impl StreamKey {
    pub fn new(
        tenant_id: TenantId,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
        }
    }

    /// 由聚合类型与标识构造
    pub fn of<A: Aggregate>(tenant_id: &TenantId, id: &A::Id) -> Self {
        Self::new(tenant_id.clone(), A::TYPE, id.to_string())
    }

    /// 由聚合实例构造
    pub fn for_aggregate<A: Aggregate>(aggregate: &A) -> Self {
        Self::of::<A>(aggregate.tenant_id(), aggregate.id())
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.tenant_id, self.aggregate_type, self.aggregate_id
        )
    }
}

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct EventRecord {
    /// 事件唯一标识符
    #[builder(default = Uuid::new_v4())]
    event_id: Uuid,
    /// 所属租户
    tenant_id: TenantId,
    /// 聚合类型
    #[builder(into)]
    aggregate_type: String,
    /// 聚合标识
    #[builder(into)]
    aggregate_id: String,
    /// 流内序号，从 0 开始连续递增
    sequence: usize,
    /// 事件类型判别符
    #[builder(into)]
    event_type: String,
    /// 事件载荷版本
    event_version: usize,
    /// 事件负载
    payload: Value,
    /// 聚合记录事件的时间（而非持久化时间）
    occurred_at: DateTime<Utc>,
}

impl EventRecord {
    /// 由聚合的待保存事件构造持久化记录
    pub fn from_pending<A: Aggregate>(
        aggregate: &A,
        pending: &PendingEvent<A::Event>,
        sequence: usize,
    ) -> DomainResult<Self> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            tenant_id: aggregate.tenant_id().clone(),
            aggregate_type: A::TYPE.to_string(),
            aggregate_id: aggregate.id().to_string(),
            sequence,
            event_type: pending.event.event_type().to_string(),
            event_version: pending.event.event_version(),
            payload: serde_json::to_value(&pending.event)?,
            occurred_at: pending.occurred_at,
        })
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn sequence(&self) -> usize {
        self.sequence
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn event_version(&self) -> usize {
        self.event_version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(
            self.tenant_id.clone(),
            self.aggregate_type.clone(),
            self.aggregate_id.clone(),
        )
    }

    /// 将负载反序列化为聚合事件
    pub fn decode<A: Aggregate>(&self) -> DomainResult<Sequenced<A::Event>> {
        if A::TYPE != self.aggregate_type {
            return Err(DomainError::TypeMismatch {
                expected: A::TYPE.to_string(),
                found: self.aggregate_type.clone(),
            });
        }

        let event = serde_json::from_value(self.payload.clone())?;
        Ok(Sequenced {
            sequence: self.sequence,
            occurred_at: self.occurred_at,
            event,
        })
    }
}

/// 批量解码
pub fn decode_records<A: Aggregate>(
    records: &[EventRecord],
) -> DomainResult<Vec<Sequenced<A::Event>>> {
    records.iter().map(EventRecord::decode::<A>).collect()
}
