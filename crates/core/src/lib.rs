//! Goop core types: the `Goop` resource, its condition ledger and the
//! child workload it owns. Nothing in here talks to a store.

#![forbid(unsafe_code)]

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod ledger;
pub mod resource;
pub mod workload;

pub use ledger::{Condition, ConditionStatus, ConditionType, Ledger, Reason};
pub use resource::{Goop, GoopSpec, GoopStatus};
pub use workload::{ChildWorkload, WorkloadDescriptor};

/// Finalizer token the operator places on every `Goop` it initializes.
pub const FINALIZER: &str = "goop.example.com/finalizer";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid object key {0:?} (expect <namespace>/<name>)")]
    Invalid(String),
    #[error("object {0} has no namespace; Goop is namespaced")]
    MissingNamespace(String),
}

/// Namespaced identity of a `Goop` and of its child workload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(KeyError::Invalid(s.to_string())),
        }
    }
}
