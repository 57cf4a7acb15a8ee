//! The `Goop` custom resource: a job run once on every node of the cluster.

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{KeyError, Ledger, ObjectKey};

/// Desired state of a distributed job.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "goop.example.com",
    version = "v1alpha1",
    kind = "Goop",
    plural = "goops",
    shortname = "gp",
    namespaced,
    status = "GoopStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.conditions[-1:].reason"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[-1:].status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GoopSpec {
    /// Free-form tag, carried for compatibility with early manifests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foo: Option<String>,

    /// Expected number of job runs; informational. Snake case on the wire,
    /// as existing manifests write it.
    #[serde(default, rename = "job_count", skip_serializing_if = "Option::is_none")]
    pub job_count: Option<i32>,

    /// Command run by the job container; the operator default applies when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    /// Job image override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GoopStatus {
    #[serde(default)]
    pub conditions: Ledger,
}

static EMPTY_LEDGER: Ledger = Ledger::new();

impl Goop {
    pub fn key(&self) -> Result<ObjectKey, KeyError> {
        let name = self.name_any();
        match self.namespace() {
            Some(ns) => Ok(ObjectKey::new(ns, name)),
            None => Err(KeyError::MissingNamespace(name)),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        self.status.as_ref().map(|s| &s.conditions).unwrap_or(&EMPTY_LEDGER)
    }

    pub fn ledger_mut(&mut self) -> &mut Ledger {
        &mut self.status.get_or_insert_with(GoopStatus::default).conditions
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers().iter().any(|f| f == token)
    }

    /// Returns false when the token was already present.
    pub fn add_finalizer(&mut self, token: &str) -> bool {
        if self.has_finalizer(token) {
            return false;
        }
        self.finalizers_mut().push(token.to_string());
        true
    }

    /// Returns false when the token was not present.
    pub fn remove_finalizer(&mut self, token: &str) -> bool {
        let fins = self.finalizers_mut();
        let before = fins.len();
        fins.retain(|f| f != token);
        fins.len() != before
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
