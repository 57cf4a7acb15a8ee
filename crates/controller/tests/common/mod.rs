#![allow(dead_code)]

use std::sync::Arc;

use goop_controller::{ControllerConfig, Reconciler, Requeue, Result};
use goop_core::{Condition, ConditionStatus, Goop, GoopSpec, ObjectKey, Reason};
use goop_store::MemStore;
use tokio_util::sync::CancellationToken;

pub const HOLD: &str = "example.com/hold";

pub fn key() -> ObjectKey { ObjectKey::new("jobs", "nightly") }

pub fn config() -> ControllerConfig {
    ControllerConfig { image: Some("busybox:1.36".into()), ..Default::default() }
}

pub fn goop() -> Goop {
    let mut g = Goop::new("nightly", GoopSpec { job_count: Some(1), ..Default::default() });
    g.metadata.namespace = Some("jobs".into());
    g
}

/// A goop whose ledger already holds `conds`, with `finalizers` attached.
pub fn goop_at(conds: &[(ConditionStatus, Reason)], finalizers: &[&str]) -> Goop {
    let mut g = goop();
    for (status, reason) in conds {
        g.ledger_mut().set(Condition::available(*status, *reason, "seeded"), "2024-01-01T00:00:00Z");
    }
    g.metadata.finalizers = Some(finalizers.iter().map(|f| f.to_string()).collect());
    g
}

pub fn setup(nodes: i32) -> (Arc<MemStore>, Reconciler) {
    let store = Arc::new(MemStore::with_nodes(nodes));
    let reconciler = Reconciler::new(store.clone(), config());
    (store, reconciler)
}

pub async fn pass(r: &Reconciler) -> Result<Requeue> {
    r.reconcile(&key(), CancellationToken::new()).await
}

pub fn reasons(store: &MemStore) -> Vec<Reason> {
    store.snapshot(&key()).map(|g| g.ledger().reasons().collect()).unwrap_or_default()
}

pub fn poll() -> Requeue { Requeue::After(config().poll_interval) }
