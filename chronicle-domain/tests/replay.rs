mod common;

use chronicle_domain::aggregate::Aggregate;
use chronicle_domain::entity::{Entity, TenantId};
use chronicle_domain::error::DomainError;
use chronicle_domain::persist::{
    AggregateRepository, EventSourcedRepository, InMemoryEventLog, ObserverSelection,
    ReplayOptions,
};
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn replayed(recorder: &Recorder) -> Vec<Dispatch> {
    recorder.all().into_iter().filter(|d| d.replaying).collect()
}

#[tokio::test]
async fn single_event_replay_sees_state_at_that_sequence() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![recording("first", &recorder, &log)]);

    let mut account = opened_account("a-1", &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
    repo.save(&mut account).await?;
    assert!(replayed(&recorder).is_empty());

    let id = "a-1".to_string();
    let at = repo
        .replay_event_by_aggregate_id(&tenant(), &id, 4, ReplayOptions::default())
        .await?;

    let expected = fold_from_log(&log, "a-1", Some(4)).await;
    assert_eq!(at.balance, expected.balance);
    assert_eq!(at.balance, 10);
    assert_eq!(at.persisted_event_count(), 5);
    assert!(!at.is_being_replayed());

    let dispatches = replayed(&recorder);
    assert_eq!(dispatches.len(), 1);
    assert_eq!(dispatches[0].sequence, 4);
    assert_eq!(dispatches[0].event_type, "AccountEvent.Deposited");
    assert_eq!(dispatches[0].durable, 10);

    // 重放从不追加事件
    assert_eq!(log.stream_len(&account_key("a-1")).await, 10);
    Ok(())
}

#[tokio::test]
async fn replaying_a_missing_event_is_not_found() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let repo = plain_repository(&log);

    let mut account = opened_account("a-1", &[1]);
    repo.save(&mut account).await?;

    let id = "a-1".to_string();
    let err = repo
        .replay_event_by_aggregate_id(&tenant(), &id, 7, ReplayOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));

    let err = repo
        .replay_event_by_aggregate_id(&tenant(), &"nobody".to_string(), 0, ReplayOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn replay_all_strips_rolled_back_events() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![recording("first", &recorder, &log)]);

    let mut account = opened_account("a-1", &[10, 20]);
    account.reverse_deposit(1, 10);
    repo.save(&mut account).await?;

    let count = repo
        .replay_all_events_by_aggregate_id(&tenant(), &"a-1".to_string(), ReplayOptions::default())
        .await?;
    assert_eq!(count, 2);

    let sequences: Vec<_> = replayed(&recorder).iter().map(|d| d.sequence).collect();
    assert_eq!(sequences, vec![0, 2]);
    assert_eq!(log.stream_len(&account_key("a-1")).await, 4);
    Ok(())
}

#[tokio::test]
async fn replay_by_event_type() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![recording("first", &recorder, &log)]);

    let mut account = opened_account("a-1", &[10, 20]);
    account.withdraw(5)?;
    repo.save(&mut account).await?;

    let id = "a-1".to_string();
    let count = repo
        .replay_events_of_type_by_aggregate_id(
            &tenant(),
            &id,
            &["AccountEvent.Deposited"],
            ReplayOptions::default(),
        )
        .await?;
    assert_eq!(count, 2);
    let sequences: Vec<_> = replayed(&recorder).iter().map(|d| d.sequence).collect();
    assert_eq!(sequences, vec![1, 2]);

    let none = repo
        .replay_events_of_type_by_aggregate_id(
            &tenant(),
            &id,
            &["AccountEvent.Closed"],
            ReplayOptions::default(),
        )
        .await?;
    assert_eq!(none, 0);
    Ok(())
}

#[tokio::test]
async fn replay_targets_selected_observers_only() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![
        recording("first", &recorder, &log),
        recording("second", &recorder, &log),
    ]);

    let mut account = opened_account("a-1", &[10]);
    repo.save(&mut account).await?;

    let options = ReplayOptions::builder()
        .observers(ObserverSelection::only(["second"]))
        .build();
    let count = repo
        .replay_all_events_by_aggregate_id(&tenant(), &"a-1".to_string(), options)
        .await?;
    assert_eq!(count, 2);

    let dispatches = replayed(&recorder);
    assert_eq!(dispatches.len(), 2);
    assert!(dispatches.iter().all(|d| d.observer == "second"));
    Ok(())
}

#[tokio::test]
async fn tenant_override_is_seen_by_observers() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![recording("first", &recorder, &log)]);

    let mut account = opened_account("a-1", &[10]);
    repo.save(&mut account).await?;

    let id = "a-1".to_string();
    let options = ReplayOptions::builder()
        .tenant_override(TenantId::new("sandbox"))
        .build();
    let at = repo
        .replay_event_by_aggregate_id(&tenant(), &id, 1, options.clone())
        .await?;
    assert_eq!(at.tenant_id(), &TenantId::new("sandbox"));

    repo.replay_all_events_by_aggregate_id(&tenant(), &id, options)
        .await?;

    let tenants: Vec<_> = replayed(&recorder).into_iter().map(|d| d.tenant).collect();
    assert_eq!(tenants, vec!["sandbox"; 3]);

    // 事件日志仍归属原租户
    assert_eq!(log.stream_len(&account_key("a-1")).await, 2);
    Ok(())
}

#[tokio::test]
async fn replaying_a_missing_aggregate_dispatches_nothing() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![recording("first", &recorder, &log)]);

    let id = "nobody".to_string();
    let all = repo
        .replay_all_events_by_aggregate_id(&tenant(), &id, ReplayOptions::default())
        .await?;
    let typed = repo
        .replay_events_of_type_by_aggregate_id(
            &tenant(),
            &id,
            &["AccountEvent.Deposited"],
            ReplayOptions::default(),
        )
        .await?;
    assert_eq!((all, typed), (0, 0));
    assert!(recorder.all().is_empty());
    Ok(())
}

#[tokio::test]
async fn replay_never_enqueues_notifications() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let queue = Arc::new(RecordingQueue::default());
    let repo = plain_repository(&log).with_notifications(queue.clone());

    let mut account = opened_account("a-1", &[10, 20]);
    repo.save(&mut account).await?;
    assert_eq!(queue.job_sizes(), vec![3]);

    let id = "a-1".to_string();
    repo.replay_all_events_by_aggregate_id(&tenant(), &id, ReplayOptions::default())
        .await?;
    repo.replay_event_by_aggregate_id(&tenant(), &id, 2, ReplayOptions::default())
        .await?;
    assert_eq!(queue.job_sizes(), vec![3]);
    Ok(())
}

#[tokio::test]
async fn replay_failure_names_the_observer() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let writer = plain_repository(&log);
    let mut account = opened_account("a-1", &[10, 13]);
    writer.save(&mut account).await?;

    // 新上线的观察者拒绝历史中的某笔存款
    let strict = EventSourcedRepository::<Account>::new(log.clone())
        .with_observers(vec![Arc::new(RejectingObserver { amount: 13 })]);
    let err = strict
        .replay_all_events_by_aggregate_id(&tenant(), &"a-1".to_string(), ReplayOptions::default())
        .await
        .unwrap_err();
    match err {
        DomainError::ObserverFailed { observer, .. } => assert_eq!(observer, "rejecting"),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(log.stream_len(&account_key("a-1")).await, 3);
    Ok(())
}

#[tokio::test]
async fn replay_saved_hook_fires_once_after_dispatch() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let recorder = Recorder::default();
    let repo = plain_repository(&log).with_observers(vec![recording("first", &recorder, &log)]);

    let mut account = opened_account("a-1", &[10, 20]);
    repo.save(&mut account).await?;

    let fired = Arc::new(AtomicUsize::new(0));
    let seen_when_fired = Arc::new(Mutex::new(Vec::new()));
    let options = {
        let fired = fired.clone();
        let seen = seen_when_fired.clone();
        let recorder = recorder.clone();
        ReplayOptions::default().on_saved(move || {
            fired.fetch_add(1, Ordering::SeqCst);
            *seen.lock().unwrap() = replayed(&recorder);
        })
    };
    assert!(options.saved.is_armed());
    // 复制的选项不携带回调
    assert!(!options.clone().saved.is_armed());

    let id = "a-1".to_string();
    let at = repo
        .replay_event_by_aggregate_id(&tenant(), &id, 2, options)
        .await?;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(!at.state().saved_hook().is_armed());

    let seen = seen_when_fired.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].sequence, 2);
    assert!(seen[0].replaying);

    // 全量重放同样在提交后触发一次
    let options = {
        let fired = fired.clone();
        ReplayOptions::default().on_saved(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };
    let count = repo
        .replay_all_events_by_aggregate_id(&tenant(), &id, options)
        .await?;
    assert_eq!(count, 3);
    assert_eq!(fired.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn replay_saved_hook_skipped_when_an_observer_fails() -> anyhow::Result<()> {
    let log = Arc::new(InMemoryEventLog::new());
    let writer = plain_repository(&log);
    let mut account = opened_account("a-1", &[10, 13]);
    writer.save(&mut account).await?;

    let strict = EventSourcedRepository::<Account>::new(log.clone())
        .with_observers(vec![Arc::new(RejectingObserver { amount: 13 })]);
    let fired = Arc::new(AtomicUsize::new(0));
    let hook = |fired: &Arc<AtomicUsize>| {
        let fired = fired.clone();
        ReplayOptions::default().on_saved(move || {
            fired.fetch_add(1, Ordering::SeqCst);
        })
    };

    let id = "a-1".to_string();
    assert!(
        strict
            .replay_event_by_aggregate_id(&tenant(), &id, 2, hook(&fired))
            .await
            .is_err()
    );
    assert!(
        strict
            .replay_all_events_by_aggregate_id(&tenant(), &id, hook(&fired))
            .await
            .is_err()
    );
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    // 未被拒绝的事件照常触发
    strict
        .replay_event_by_aggregate_id(&tenant(), &id, 1, hook(&fired))
        .await?;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    Ok(())
}
