#![forbid(unsafe_code)]

mod common;

use common::*;
use goop_controller::{Error, Requeue};
use goop_core::{ChildWorkload, ConditionStatus, Reason};
use goop_store::{Op, StoreError};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn first_pass_initializes_attaches_finalizer_and_deploys() {
    let (store, r) = setup(1);
    store.insert(goop());

    assert_eq!(pass(&r).await.unwrap(), poll());

    let g = store.snapshot(&key()).unwrap();
    assert!(g.has_finalizer(goop_core::FINALIZER));
    assert_eq!(reasons(&store), vec![Reason::Initialized, Reason::Deployed]);
    let first = g.ledger().iter().next().unwrap();
    assert_eq!(first.status, ConditionStatus::True);
    assert_eq!(first.message, "Initialization completed");
    assert!(g.ledger().is_complete(Reason::Deployed));

    let desc = store.workload(&key()).expect("workload created");
    assert_eq!(desc.image, "busybox:1.36");
    assert_eq!(desc.owner.as_ref().map(|o| o.uid.as_str()), g.metadata.uid.as_deref());
}

#[tokio::test]
async fn lagging_first_write_walks_through_every_stage() {
    let (store, r) = setup(2);
    store.insert(goop());
    store.drop_status_writes(1);

    // pass 1: the first condition does not read back yet
    assert_eq!(pass(&r).await.unwrap(), Requeue::Immediate);
    assert!(reasons(&store).is_empty());
    assert_eq!(store.calls(Op::Update), 0);

    // pass 2: finalizer, Initialized/True, workload and Deployed in one go
    assert_eq!(pass(&r).await.unwrap(), poll());
    assert!(store.snapshot(&key()).unwrap().has_finalizer(goop_core::FINALIZER));
    assert_eq!(reasons(&store), vec![Reason::Initialized, Reason::Deployed]);

    // pass 3: workload not ready
    store.tick_workload(&key());
    let before = store.snapshot(&key()).unwrap().ledger().clone();
    assert_eq!(pass(&r).await.unwrap(), poll());
    assert_eq!(store.snapshot(&key()).unwrap().ledger(), &before);

    // pass 4: ready
    store.tick_workload(&key());
    assert_eq!(pass(&r).await.unwrap(), Requeue::None);
    assert_eq!(reasons(&store), vec![Reason::Initialized, Reason::Deployed, Reason::Completed]);
    assert!(store.snapshot(&key()).unwrap().ledger().is_complete(Reason::Completed));
}

#[tokio::test]
async fn completed_goop_costs_no_writes() {
    let (store, r) = setup(1);
    store.insert(goop());
    pass(&r).await.unwrap();
    store.tick_workload(&key());
    assert_eq!(pass(&r).await.unwrap(), Requeue::None);
    assert!(store.snapshot(&key()).unwrap().ledger().is_complete(Reason::Completed));

    let writes = store.writes();
    for _ in 0..3 {
        assert_eq!(pass(&r).await.unwrap(), Requeue::None);
    }
    assert_eq!(store.writes(), writes);
}

#[tokio::test]
async fn reasons_only_ever_grow_along_the_lifecycle() {
    const ORDER: [Reason; 3] = [Reason::Initialized, Reason::Deployed, Reason::Completed];
    let (store, r) = setup(3);
    store.insert(goop());
    for _ in 0..8 {
        pass(&r).await.unwrap();
        let seen = reasons(&store);
        assert!(seen.len() <= ORDER.len());
        assert_eq!(seen.as_slice(), &ORDER[..seen.len()], "ledger out of order: {seen:?}");
        store.tick_workload(&key());
    }
    assert_eq!(reasons(&store), ORDER.to_vec());
}

#[tokio::test]
async fn completion_lands_on_the_tick_counts_match() {
    let (store, r) = setup(3);
    store.insert(goop());
    assert_eq!(pass(&r).await.unwrap(), poll());

    for tick in 1..=3 {
        let w = store.tick_workload(&key()).unwrap();
        assert_eq!(w.ready, tick);
        let rq = pass(&r).await.unwrap();
        let done = store.snapshot(&key()).unwrap().ledger().is_complete(Reason::Completed);
        if tick < 3 {
            assert_eq!(rq, poll(), "tick {tick}");
            assert!(!done, "completed early on tick {tick}");
        } else {
            assert_eq!(rq, Requeue::None);
            assert!(done);
        }
    }
}

#[tokio::test]
async fn partially_available_workload_keeps_polling() {
    let (store, r) = setup(2);
    store.insert(goop());
    pass(&r).await.unwrap();
    store.set_workload_status(&key(), ChildWorkload { desired: 2, ready: 2, available: 1, observed: true });
    assert_eq!(pass(&r).await.unwrap(), poll());
    store.set_workload_status(&key(), ChildWorkload { desired: 2, ready: 2, available: 2, observed: false });
    assert_eq!(pass(&r).await.unwrap(), poll());
    assert_eq!(reasons(&store), vec![Reason::Initialized, Reason::Deployed]);
}

#[tokio::test]
async fn status_conflict_is_returned_not_retried() {
    let (store, r) = setup(1);
    store.insert(goop());
    store.fail_next(Op::UpdateStatus, StoreError::conflict(&key(), "object has been modified"));

    let err = pass(&r).await.unwrap_err();
    assert!(err.is_conflict(), "{err}");
    assert_eq!(store.calls(Op::UpdateStatus), 1);
    assert!(reasons(&store).is_empty());

    // redelivery converges
    assert_eq!(pass(&r).await.unwrap(), poll());
}

#[tokio::test]
async fn out_of_band_edit_is_picked_up_by_next_pass() {
    let (store, r) = setup(1);
    store.insert(goop());
    pass(&r).await.unwrap();
    // another client bumps the object while the dispatcher waits
    store.modify(&key(), |g| {
        g.metadata.labels.get_or_insert_with(Default::default).insert("team".into(), "batch".into());
    });
    store.tick_workload(&key());
    // level-triggered: the pass reads the latest version, so no conflict
    assert_eq!(pass(&r).await.unwrap(), Requeue::None);
}

#[tokio::test]
async fn missing_goop_ends_the_pass_quietly() {
    let (store, r) = setup(1);
    assert_eq!(pass(&r).await.unwrap(), Requeue::None);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn fetch_failure_goes_back_to_the_dispatcher() {
    let (store, r) = setup(1);
    store.insert(goop());
    store.fail_next(Op::Get, StoreError::Transient("apiserver unavailable".into()));
    assert!(matches!(pass(&r).await, Err(Error::Store(StoreError::Transient(_)))));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn workload_lookup_error_stops_before_creating() {
    let (store, r) = setup(1);
    store.insert(goop());
    store.fail_next(Op::GetWorkload, StoreError::Api { code: 403, message: "forbidden".into() });
    assert!(matches!(pass(&r).await, Err(Error::Store(StoreError::Api { code: 403, .. }))));
    assert_eq!(store.calls(Op::CreateWorkload), 0);
    assert!(store.workload(&key()).is_none());
}

#[tokio::test]
async fn cancelled_pass_writes_nothing() {
    let (store, r) = setup(1);
    store.insert(goop());
    let token = CancellationToken::new();
    token.cancel();
    assert!(matches!(r.reconcile(&key(), token).await, Err(Error::Cancelled)));
    assert_eq!(store.writes(), 0);
    assert_eq!(store.calls(Op::Get), 0);
}

#[tokio::test]
async fn workload_found_while_initialized_is_adopted() {
    let (store, r) = setup(1);
    let g = store.insert(goop_at(&[(ConditionStatus::True, Reason::Initialized)], &[goop_core::FINALIZER]));
    let desc = goop_controller::workload::descriptor_for(&g, r.config()).unwrap();
    goop_store::ResourceStore::create_workload(store.as_ref(), &desc).await.unwrap();

    assert_eq!(pass(&r).await.unwrap(), poll());
    assert_eq!(reasons(&store), vec![Reason::Initialized, Reason::Deployed]);
    assert_eq!(store.calls(Op::CreateWorkload), 1);
}

#[tokio::test]
async fn workload_deleted_out_of_band_degrades_the_goop() {
    let (store, r) = setup(1);
    store.insert(goop());
    assert_eq!(pass(&r).await.unwrap(), poll());
    assert!(store.remove_workload(&key()));

    assert!(matches!(pass(&r).await, Err(Error::MissingWorkload(_))));
    let g = store.snapshot(&key()).unwrap();
    let degraded = g.ledger().latest(goop_core::ConditionType::Degradation).expect("degraded condition");
    assert_eq!(degraded.status, ConditionStatus::True);
    assert_eq!(degraded.reason, Reason::Deployed);
    assert_eq!(store.calls(Op::CreateWorkload), 1, "not recreated");

    let writes = store.writes();
    assert!(matches!(pass(&r).await, Err(Error::MissingWorkload(_))));
    assert_eq!(store.writes(), writes, "condition already recorded");
}
