use crate::{
    aggregate::Aggregate,
    entity::{Entity, TenantId},
    error::{DomainError, DomainResult as Result},
    persist::StreamKey,
};
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 聚合快照：`version` 为折叠进状态的最后一个事件序号
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SnapshotRecord {
    tenant_id: TenantId,
    #[builder(into)]
    aggregate_type: String,
    #[builder(into)]
    aggregate_id: String,
    version: usize,
    payload: Value,
    #[builder(default = Utc::now())]
    taken_at: DateTime<Utc>,
}

impl SnapshotRecord {
    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.aggregate_type
    }

    pub fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    pub fn version(&self) -> usize {
        self.version
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(
            self.tenant_id.clone(),
            self.aggregate_type.clone(),
            self.aggregate_id.clone(),
        )
    }

    /// 将快照反序列化为聚合实例
    pub fn to_aggregate<A>(&self) -> Result<A>
    where
        A: Aggregate,
    {
        if A::TYPE != self.aggregate_type {
            return Err(DomainError::TypeMismatch {
                expected: A::TYPE.to_string(),
                found: self.aggregate_type.clone(),
            });
        }

        let aggregate: A = serde_json::from_value(self.payload.clone())?;
        if aggregate.persisted_event_count() != self.version + 1 {
            return Err(DomainError::SnapshotStore {
                reason: format!(
                    "snapshot of {} at version {} carries event count {}",
                    self.stream_key(),
                    self.version,
                    aggregate.persisted_event_count()
                ),
            });
        }
        Ok(aggregate)
    }

    /// 从聚合实例创建快照，`version` 为已折叠的最后一个序号
    pub fn from_aggregate<A>(aggregate: &A, version: usize) -> Result<Self>
    where
        A: Aggregate,
    {
        Ok(Self {
            tenant_id: aggregate.tenant_id().clone(),
            aggregate_type: A::TYPE.to_string(),
            aggregate_id: aggregate.id().to_string(),
            version,
            payload: serde_json::to_value(aggregate)?,
            taken_at: Utc::now(),
        })
    }
}
