//! Goop store contract: the capability surface the controller consumes.
//!
//! Backends: [`MemStore`] (in RAM, used by tests and local dry runs) and the
//! Kubernetes-backed store in `goop-kubehub`.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use goop_core::{ChildWorkload, Goop, ObjectKey, WorkloadDescriptor};

mod mem;

pub use mem::{MemStore, Op};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: String },
    /// Optimistic-concurrency rejection: the object changed since it was read.
    #[error("conflict on {key}: {message}")]
    Conflict { key: String, message: String },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: String },
    #[error("api error {code}: {message}")]
    Api { code: u16, message: String },
    /// Network or availability failure; retry later.
    #[error("transient store error: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, key: &ObjectKey) -> Self {
        Self::NotFound { kind, key: key.to_string() }
    }

    pub fn conflict(key: &ObjectKey, message: impl Into<String>) -> Self {
        Self::Conflict { key: key.to_string(), message: message.into() }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }
    pub fn is_conflict(&self) -> bool { matches!(self, Self::Conflict { .. }) }

    /// Short stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::AlreadyExists { .. } => "already_exists",
            Self::Api { .. } => "api",
            Self::Transient(_) => "transient",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operations used by the reconcile loop. Writes are optimistically
/// concurrency-controlled: a stale `resourceVersion` yields `Conflict`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Goop>;

    /// Persist metadata and spec (finalizers included); status is ignored.
    async fn update(&self, goop: &Goop) -> StoreResult<Goop>;

    /// Persist the status sub-object only.
    async fn update_status(&self, goop: &Goop) -> StoreResult<Goop>;

    async fn get_workload(&self, key: &ObjectKey) -> StoreResult<ChildWorkload>;

    /// Create the child workload; the backend links it to `desc.owner` so that
    /// deleting the `Goop` deletes it.
    async fn create_workload(&self, desc: &WorkloadDescriptor) -> StoreResult<()>;
}

#[async_trait]
impl<T: ResourceStore + ?Sized> ResourceStore for std::sync::Arc<T> {
    async fn get(&self, key: &ObjectKey) -> StoreResult<Goop> { (**self).get(key).await }
    async fn update(&self, goop: &Goop) -> StoreResult<Goop> { (**self).update(goop).await }
    async fn update_status(&self, goop: &Goop) -> StoreResult<Goop> { (**self).update_status(goop).await }
    async fn get_workload(&self, key: &ObjectKey) -> StoreResult<ChildWorkload> { (**self).get_workload(key).await }
    async fn create_workload(&self, desc: &WorkloadDescriptor) -> StoreResult<()> { (**self).create_workload(desc).await }
}
