//! In-RAM store with apiserver-like semantics: resourceVersion checks,
//! status/metadata split, finalizer-gated deletion and owner cascade.
//! Test hooks inject faults, lag status writes and advance workload rollout.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use goop_core::{ChildWorkload, Goop, ObjectKey, WorkloadDescriptor};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::ResourceExt;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{ResourceStore, StoreError, StoreResult};

const GOOP: &str = "Goop";
const WORKLOAD: &str = "DaemonSet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Update,
    UpdateStatus,
    GetWorkload,
    CreateWorkload,
}

impl Op {
    fn is_write(self) -> bool {
        matches!(self, Op::Update | Op::UpdateStatus | Op::CreateWorkload)
    }
}

struct Workload {
    desc: WorkloadDescriptor,
    status: ChildWorkload,
}

#[derive(Default)]
struct Inner {
    goops: FxHashMap<ObjectKey, Goop>,
    workloads: FxHashMap<ObjectKey, Workload>,
    rv: u64,
    faults: FxHashMap<Op, VecDeque<StoreError>>,
    dropped_status_writes: u32,
    calls: FxHashMap<Op, u64>,
}

impl Inner {
    fn next_rv(&mut self) -> String {
        self.rv += 1;
        self.rv.to_string()
    }

    fn record(&mut self, op: Op) -> StoreResult<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.faults.get_mut(&op).and_then(|q| q.pop_front()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_version(&self, key: &ObjectKey, incoming: &Goop) -> StoreResult<()> {
        let stored = self.goops.get(key).ok_or_else(|| StoreError::not_found(GOOP, key))?;
        if incoming.resource_version() != stored.resource_version() {
            return Err(StoreError::conflict(
                key,
                "the object has been modified; please apply your changes to the latest version and try again",
            ));
        }
        Ok(())
    }

    /// Physically remove a `Goop` and everything it owns.
    fn purge(&mut self, key: &ObjectKey) {
        self.goops.remove(key);
        if self.workloads.remove(key).is_some() {
            debug!(%key, "cascade deleted child workload");
        }
    }
}

pub struct MemStore {
    inner: Mutex<Inner>,
    nodes: i32,
    latency: Option<Duration>,
}

impl Default for MemStore {
    fn default() -> Self { Self::new() }
}

impl MemStore {
    /// Store simulating a single-node cluster.
    pub fn new() -> Self { Self::with_nodes(1) }

    /// Newly created workloads report `nodes` desired replicas.
    pub fn with_nodes(nodes: i32) -> Self {
        Self { inner: Mutex::new(Inner::default()), nodes, latency: None }
    }

    /// Delay every call by `latency` before it touches state.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn delay(&self) {
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
    }

    /// Create a `Goop` as a user would; uid and resourceVersion are assigned here.
    pub fn insert(&self, mut goop: Goop) -> Goop {
        let mut inner = self.lock();
        goop.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        goop.metadata.resource_version = Some(inner.next_rv());
        goop.metadata.creation_timestamp = Some(Time(chrono::Utc::now()));
        if let Ok(key) = goop.key() {
            inner.goops.insert(key, goop.clone());
        }
        goop
    }

    /// Request deletion: immediate when no finalizers remain, otherwise only
    /// `deletionTimestamp` is set.
    pub fn request_delete(&self, key: &ObjectKey) -> bool {
        let mut inner = self.lock();
        let Some(stored) = inner.goops.get(key) else { return false };
        if stored.finalizers().is_empty() {
            inner.purge(key);
            return true;
        }
        let rv = inner.next_rv();
        if let Some(stored) = inner.goops.get_mut(key) {
            if stored.metadata.deletion_timestamp.is_none() {
                stored.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            }
            stored.metadata.resource_version = Some(rv);
        }
        true
    }

    /// Edit the stored object out of band, as another client would.
    pub fn modify(&self, key: &ObjectKey, f: impl FnOnce(&mut Goop)) -> bool {
        let mut inner = self.lock();
        let rv = inner.next_rv();
        match inner.goops.get_mut(key) {
            Some(g) => {
                f(g);
                g.metadata.resource_version = Some(rv);
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, key: &ObjectKey) -> Option<Goop> {
        self.lock().goops.get(key).cloned()
    }

    pub fn workload(&self, key: &ObjectKey) -> Option<WorkloadDescriptor> {
        self.lock().workloads.get(key).map(|w| w.desc.clone())
    }

    /// Delete the child workload out of band; the owning `Goop` is untouched.
    pub fn remove_workload(&self, key: &ObjectKey) -> bool {
        self.lock().workloads.remove(key).is_some()
    }

    pub fn workload_status(&self, key: &ObjectKey) -> Option<ChildWorkload> {
        self.lock().workloads.get(key).map(|w| w.status)
    }

    pub fn set_workload_status(&self, key: &ObjectKey, status: ChildWorkload) -> bool {
        match self.lock().workloads.get_mut(key) {
            Some(w) => {
                w.status = status;
                true
            }
            None => false,
        }
    }

    /// One more replica becomes ready and available, up to the desired count.
    pub fn tick_workload(&self, key: &ObjectKey) -> Option<ChildWorkload> {
        let mut inner = self.lock();
        let w = inner.workloads.get_mut(key)?;
        if w.status.ready < w.status.desired {
            w.status.ready += 1;
        }
        if w.status.available < w.status.ready {
            w.status.available += 1;
        }
        Some(w.status)
    }

    /// Fail the next call of `op` with `err` (queued per op).
    pub fn fail_next(&self, op: Op, err: StoreError) {
        self.lock().faults.entry(op).or_default().push_back(err);
    }

    /// Acknowledge the next `n` status writes without persisting them, as a
    /// lagging replica would.
    pub fn drop_status_writes(&self, n: u32) {
        self.lock().dropped_status_writes = n;
    }

    pub fn calls(&self, op: Op) -> u64 {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Write attempts (metadata, status and workload creation), successful or not.
    pub fn writes(&self) -> u64 {
        self.lock().calls.iter().filter(|(op, _)| op.is_write()).map(|(_, n)| *n).sum()
    }
}

#[async_trait]
impl ResourceStore for MemStore {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Goop> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(Op::Get)?;
        inner.goops.get(key).cloned().ok_or_else(|| StoreError::not_found(GOOP, key))
    }

    async fn update(&self, goop: &Goop) -> StoreResult<Goop> {
        self.delay().await;
        let key = goop.key().map_err(|e| StoreError::Api { code: 422, message: e.to_string() })?;
        let mut inner = self.lock();
        inner.record(Op::Update)?;
        inner.check_version(&key, goop)?;
        let rv = inner.next_rv();
        let stored = inner.goops.get_mut(&key).ok_or_else(|| StoreError::not_found(GOOP, &key))?;
        if stored.is_deletion_requested() && goop.finalizers().iter().any(|f| !stored.finalizers().contains(f)) {
            return Err(StoreError::Api {
                code: 422,
                message: "Forbidden: no new finalizers can be added if the object is being deleted".into(),
            });
        }
        stored.metadata.finalizers = goop.metadata.finalizers.clone();
        stored.metadata.labels = goop.metadata.labels.clone();
        stored.metadata.annotations = goop.metadata.annotations.clone();
        stored.spec = goop.spec.clone();
        stored.metadata.resource_version = Some(rv);
        let out = stored.clone();
        if out.is_deletion_requested() && out.finalizers().is_empty() {
            debug!(%key, "last finalizer removed; deleting");
            inner.purge(&key);
        }
        Ok(out)
    }

    async fn update_status(&self, goop: &Goop) -> StoreResult<Goop> {
        self.delay().await;
        let key = goop.key().map_err(|e| StoreError::Api { code: 422, message: e.to_string() })?;
        let mut inner = self.lock();
        inner.record(Op::UpdateStatus)?;
        inner.check_version(&key, goop)?;
        if inner.dropped_status_writes > 0 {
            inner.dropped_status_writes -= 1;
            debug!(%key, "status write acknowledged but not persisted");
            return inner.goops.get(&key).cloned().ok_or_else(|| StoreError::not_found(GOOP, &key));
        }
        let rv = inner.next_rv();
        let stored = inner.goops.get_mut(&key).ok_or_else(|| StoreError::not_found(GOOP, &key))?;
        stored.status = goop.status.clone();
        stored.metadata.resource_version = Some(rv);
        Ok(stored.clone())
    }

    async fn get_workload(&self, key: &ObjectKey) -> StoreResult<ChildWorkload> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(Op::GetWorkload)?;
        inner.workloads.get(key).map(|w| w.status).ok_or_else(|| StoreError::not_found(WORKLOAD, key))
    }

    async fn create_workload(&self, desc: &WorkloadDescriptor) -> StoreResult<()> {
        self.delay().await;
        let mut inner = self.lock();
        inner.record(Op::CreateWorkload)?;
        if inner.workloads.contains_key(&desc.key) {
            return Err(StoreError::AlreadyExists { kind: WORKLOAD, key: desc.key.to_string() });
        }
        if let Some(owner) = &desc.owner {
            let owner_alive = inner
                .goops
                .get(&desc.key)
                .is_some_and(|g| g.metadata.uid.as_deref() == Some(owner.uid.as_str()));
            if !owner_alive {
                return Err(StoreError::not_found(GOOP, &desc.key));
            }
        }
        let status = ChildWorkload { desired: self.nodes, ready: 0, available: 0, observed: true };
        inner.workloads.insert(desc.key.clone(), Workload { desc: desc.clone(), status });
        Ok(())
    }
}
