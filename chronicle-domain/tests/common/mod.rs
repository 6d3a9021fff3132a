#![allow(dead_code)]

use async_trait::async_trait;
use chronicle_domain::aggregate::{Aggregate, Sequenced};
use chronicle_domain::entity::{Entity, TenantId};
use chronicle_domain::error::{DomainError, DomainResult};
use chronicle_domain::eventing::{NotificationJob, NotificationQueue};
use chronicle_domain::persist::{
    AggregateRepository, EventLog, EventSourcedRepository, InMemoryEventLog, Observer,
    StreamKey, UnitOfWork,
};
use chronicle_macros::{domain_event, entity};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

// ---------- Account ----------

#[domain_event]
pub enum AccountEvent {
    Opened { owner: String },
    Deposited { amount: i64 },
    Withdrawn { amount: i64 },
    DepositReversed { deposit_sequence: usize, amount: i64 },
}

#[entity(id = String, event = AccountEvent)]
pub struct Account {
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn open(&mut self, owner: &str) {
        self.record(AccountEvent::Opened {
            owner: owner.to_string(),
        });
    }

    pub fn deposit(&mut self, amount: i64) {
        self.record(AccountEvent::Deposited { amount });
    }

    pub fn withdraw(&mut self, amount: i64) -> DomainResult<()> {
        if amount > self.balance {
            return Err(DomainError::InvalidState {
                reason: "insufficient balance".into(),
            });
        }
        self.record(AccountEvent::Withdrawn { amount });
        Ok(())
    }

    pub fn reverse_deposit(&mut self, deposit_sequence: usize, amount: i64) {
        self.record(AccountEvent::DepositReversed {
            deposit_sequence,
            amount,
        });
    }
}

impl Aggregate for Account {
    const TYPE: &'static str = "account";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::Opened { owner } => self.owner = owner.clone(),
            AccountEvent::Deposited { amount } => self.balance += amount,
            AccountEvent::Withdrawn { amount } => self.balance -= amount,
            AccountEvent::DepositReversed { amount, .. } => self.balance -= amount,
        }
    }

    fn remaining_events_after_rollback(
        events: Vec<Sequenced<Self::Event>>,
    ) -> Vec<Sequenced<Self::Event>> {
        let reversed: HashSet<usize> = events
            .iter()
            .filter_map(|e| match e.event {
                AccountEvent::DepositReversed {
                    deposit_sequence, ..
                } => Some(deposit_sequence),
                _ => None,
            })
            .collect();

        events
            .into_iter()
            .filter(|e| !matches!(e.event, AccountEvent::DepositReversed { .. }))
            .filter(|e| !reversed.contains(&e.sequence))
            .collect()
    }
}

pub fn tenant() -> TenantId {
    TenantId::new("acme")
}

pub fn account_key(id: &str) -> StreamKey {
    StreamKey::of::<Account>(&tenant(), &id.to_string())
}

/// 新开账户并记录 `deposits` 笔存款（未保存）
pub fn opened_account(id: &str, deposits: &[i64]) -> Account {
    let mut account = Account::new(tenant(), id.to_string());
    account.open("alice");
    for amount in deposits {
        account.deposit(*amount);
    }
    account
}

/// 仅依赖事件日志的全量折叠
pub async fn fold_from_log(log: &InMemoryEventLog, id: &str, through: Option<usize>) -> Account {
    let records = log.read_all(&account_key(id)).await.unwrap();
    let events = records
        .iter()
        .filter(|r| through.is_none_or(|t| r.sequence() <= t))
        .map(|r| r.decode::<Account>().unwrap());
    Account::from_events(tenant(), id.to_string(), events)
}

// ---------- Ledger（被观察者在同一工作单元内保存的第二个聚合） ----------

#[domain_event]
pub enum LedgerEvent {
    Posted { account_id: String, sequence: usize },
}

#[entity(id = String, event = LedgerEvent)]
pub struct Ledger {
    pub postings: Vec<(String, usize)>,
}

impl Aggregate for Ledger {
    const TYPE: &'static str = "ledger";

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::Posted {
                account_id,
                sequence,
            } => self.postings.push((account_id.clone(), *sequence)),
        }
    }
}

pub const LEDGER_ID: &str = "main";

// ---------- Observers ----------

#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub observer: String,
    pub tenant: String,
    pub aggregate_id: String,
    pub sequence: usize,
    pub event_type: String,
    pub replaying: bool,
    pub durable: usize,
}

#[derive(Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Vec<Dispatch>>>,
}

impl Recorder {
    pub fn all(&self) -> Vec<Dispatch> {
        self.inner.lock().unwrap().clone()
    }

    pub fn sequences(&self, observer: &str) -> Vec<usize> {
        self.all()
            .into_iter()
            .filter(|d| d.observer == observer)
            .map(|d| d.sequence)
            .collect()
    }
}

/// 记录每次分发，以及分发时事件流已持久化的条数
pub struct RecordingObserver {
    pub name: String,
    pub recorder: Recorder,
    pub log: Arc<InMemoryEventLog>,
}

#[async_trait]
impl Observer<Account> for RecordingObserver {
    fn observer_name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        _uow: &mut UnitOfWork,
        aggregate: &Account,
        event: &AccountEvent,
        sequence: usize,
    ) -> DomainResult<()> {
        use chronicle_domain::domain_event::DomainEvent;

        let durable = self
            .log
            .stream_len(&StreamKey::for_aggregate(aggregate))
            .await;
        self.recorder.inner.lock().unwrap().push(Dispatch {
            observer: self.name.clone(),
            tenant: aggregate.tenant_id().to_string(),
            aggregate_id: aggregate.id().clone(),
            sequence,
            event_type: event.event_type().to_string(),
            replaying: aggregate.is_being_replayed(),
            durable,
        });
        Ok(())
    }
}

/// 余额读模型：通过暂存写入在提交时生效
#[derive(Clone, Default)]
pub struct BalanceProjection {
    pub balances: Arc<Mutex<HashMap<String, i64>>>,
}

impl BalanceProjection {
    pub fn balance(&self, id: &str) -> Option<i64> {
        self.balances.lock().unwrap().get(id).copied()
    }
}

#[async_trait]
impl Observer<Account> for BalanceProjection {
    fn observer_name(&self) -> &str {
        "balances"
    }

    async fn handle(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &Account,
        _event: &AccountEvent,
        _sequence: usize,
    ) -> DomainResult<()> {
        let balances = self.balances.clone();
        let id = aggregate.id().clone();
        let balance = aggregate.balance;
        uow.stage_write(move || {
            balances.lock().unwrap().insert(id, balance);
        });
        Ok(())
    }
}

/// 拒绝指定金额的存款
pub struct RejectingObserver {
    pub amount: i64,
}

#[async_trait]
impl Observer<Account> for RejectingObserver {
    fn observer_name(&self) -> &str {
        "rejecting"
    }

    async fn handle(
        &self,
        _uow: &mut UnitOfWork,
        _aggregate: &Account,
        event: &AccountEvent,
        _sequence: usize,
    ) -> DomainResult<()> {
        match event {
            AccountEvent::Deposited { amount } if *amount == self.amount => {
                Err(DomainError::InvalidState {
                    reason: format!("deposit of {amount} rejected"),
                })
            }
            _ => Ok(()),
        }
    }
}

/// 在同一工作单元内把每个账户事件登记到总账
pub struct LedgerWriter {
    pub ledgers: Arc<dyn AggregateRepository<Ledger>>,
}

#[async_trait]
impl Observer<Account> for LedgerWriter {
    fn observer_name(&self) -> &str {
        "ledger"
    }

    async fn handle(
        &self,
        uow: &mut UnitOfWork,
        aggregate: &Account,
        _event: &AccountEvent,
        sequence: usize,
    ) -> DomainResult<()> {
        let ledger_id = LEDGER_ID.to_string();
        let mut ledger = match self
            .ledgers
            .get_by_id_in(uow, aggregate.tenant_id(), &ledger_id)
            .await?
        {
            Some(ledger) => ledger,
            None => Ledger::new(aggregate.tenant_id().clone(), ledger_id),
        };
        ledger.record(LedgerEvent::Posted {
            account_id: aggregate.id().clone(),
            sequence,
        });
        self.ledgers.save_in(uow, &mut ledger).await
    }
}

// ---------- Notification queue ----------

#[derive(Default)]
pub struct RecordingQueue {
    pub jobs: Mutex<Vec<NotificationJob>>,
}

impl RecordingQueue {
    pub fn job_sizes(&self) -> Vec<usize> {
        self.jobs
            .lock()
            .unwrap()
            .iter()
            .map(|job| job.records().len())
            .collect()
    }
}

impl NotificationQueue for RecordingQueue {
    fn enqueue(&self, job: NotificationJob) -> DomainResult<()> {
        self.jobs.lock().unwrap().push(job);
        Ok(())
    }
}

// ---------- Wiring ----------

pub fn recording(
    name: &str,
    recorder: &Recorder,
    log: &Arc<InMemoryEventLog>,
) -> Arc<RecordingObserver> {
    Arc::new(RecordingObserver {
        name: name.to_string(),
        recorder: recorder.clone(),
        log: log.clone(),
    })
}

pub fn plain_repository(log: &Arc<InMemoryEventLog>) -> EventSourcedRepository<Account> {
    EventSourcedRepository::new(log.clone())
}
