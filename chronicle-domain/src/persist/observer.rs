//! 聚合观察者（Observer）与分发器
//!
//! 观察者在保存流程中同步接收每个待保存事件（以及分配给它的序号），
//! 可在同一工作单元内暂存写入、注册提交回调或保存其他聚合。
//! 任一观察者失败即中止本次保存，工作单元不会提交。
//!
use crate::{
    aggregate::Aggregate,
    error::{DomainError, DomainResult as Result},
    persist::UnitOfWork,
};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Observer<A: Aggregate>: Send + Sync {
    /// 稳定的观察者名称，重放时用于选择子集
    fn observer_name(&self) -> &str;

    async fn handle(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &A,
        event: &A::Event,
        sequence: usize,
    ) -> Result<()>;
}

/// 观察者选择
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ObserverSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl ObserverSelection {
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ObserverSelection::Only(names.into_iter().map(Into::into).collect())
    }

    pub fn includes(&self, name: &str) -> bool {
        match self {
            ObserverSelection::All => true,
            ObserverSelection::Only(names) => names.iter().any(|n| n == name),
        }
    }
}

/// 按注册顺序分发事件给观察者
pub struct ObserverDispatcher<A: Aggregate> {
    observers: Vec<Arc<dyn Observer<A>>>,
}

impl<A: Aggregate> Default for ObserverDispatcher<A> {
    fn default() -> Self {
        Self {
            observers: Vec::new(),
        }
    }
}

impl<A: Aggregate> Clone for ObserverDispatcher<A> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

impl<A: Aggregate> ObserverDispatcher<A> {
    pub fn new(observers: Vec<Arc<dyn Observer<A>>>) -> Self {
        Self { observers }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.observers.iter().map(|o| o.observer_name()).collect()
    }

    pub async fn dispatch(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &A,
        event: &A::Event,
        sequence: usize,
        selection: &ObserverSelection,
    ) -> Result<()> {
        for observer in &self.observers {
            let name = observer.observer_name();
            if !selection.includes(name) {
                continue;
            }
            observer
                .handle(uow, aggregate, event, sequence)
                .await
                .map_err(|source| DomainError::ObserverFailed {
                    observer: name.to_string(),
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }
}
