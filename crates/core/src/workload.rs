//! Child workload: the per-node replicated job created on behalf of a `Goop`.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::{Deserialize, Serialize};

use crate::ObjectKey;

/// Observed rollout counts of the child workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildWorkload {
    pub desired: i32,
    pub ready: i32,
    pub available: i32,
    /// Whether the workload controller has published status for the current generation.
    pub observed: bool,
}

impl ChildWorkload {
    pub fn is_complete(&self) -> bool {
        self.observed && self.desired == self.ready && self.desired == self.available
    }
}

/// What the operator asks the store to create. Rendering it into a concrete
/// object (containers, security context) belongs to the store backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadDescriptor {
    pub key: ObjectKey,
    pub labels: BTreeMap<String, String>,
    pub image: String,
    pub command: Vec<String>,
    pub job_count: Option<i32>,
    /// Controller reference back to the owning `Goop`; deletion cascades through it.
    pub owner: Option<OwnerReference>,
}
