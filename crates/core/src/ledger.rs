//! Condition ledger: the ordered status log that encodes the lifecycle state.
//!
//! The last appended condition is the current state; its `reason` is the state
//! tag and its `status` says whether that state has been reached (`True`) or is
//! still being worked on. Entries are appended or replaced, never reordered or
//! pruned.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionType {
    #[serde(rename = "Available")]
    Availability,
    #[serde(rename = "Degraded")]
    Degradation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionType {
    /// Wire name, as written in `.status.conditions[].type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Availability => "Available",
            ConditionType::Degradation => "Degraded",
        }
    }
}

impl ConditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

/// Lifecycle state tag carried in `Condition::reason`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Reason {
    Initialized,
    Deployed,
    Completed,
    Finalized,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Initialized => "Initialized",
            Reason::Deployed => "Deployed",
            Reason::Completed => "Completed",
            Reason::Finalized => "Finalized",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub reason: Reason,
    #[serde(default)]
    pub message: String,
    /// RFC3339 timestamp of the last status change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl Condition {
    pub fn new(type_: ConditionType, status: ConditionStatus, reason: Reason, message: impl Into<String>) -> Self {
        Self { type_, status, reason, message: message.into(), last_transition_time: None }
    }

    pub fn available(status: ConditionStatus, reason: Reason, message: impl Into<String>) -> Self {
        Self::new(ConditionType::Availability, status, reason, message)
    }

    pub fn degraded(status: ConditionStatus, reason: Reason, message: impl Into<String>) -> Self {
        Self::new(ConditionType::Degradation, status, reason, message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Ledger(Vec<Condition>);

impl Ledger {
    pub const fn new() -> Self { Self(Vec::new()) }

    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_initial(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, Condition> { self.0.iter() }

    /// The last appended condition, i.e. the current lifecycle state.
    pub fn current(&self) -> Option<&Condition> { self.0.last() }

    /// Most recently set condition of `type_`.
    pub fn latest(&self, type_: ConditionType) -> Option<&Condition> {
        self.0.iter().rev().find(|c| c.type_ == type_)
    }

    pub fn is_state(&self, reason: Reason) -> bool {
        self.current().is_some_and(|c| c.reason == reason)
    }

    pub fn is_complete(&self, reason: Reason) -> bool {
        self.current().is_some_and(|c| c.reason == reason && c.status == ConditionStatus::True)
    }

    pub fn is_incomplete(&self, reason: Reason) -> bool {
        self.current().is_some_and(|c| c.reason == reason && c.status != ConditionStatus::True)
    }

    /// Reasons in insertion order.
    pub fn reasons(&self) -> impl Iterator<Item = Reason> + '_ {
        self.0.iter().map(|c| c.reason)
    }

    /// Record `cond`. The live condition of the same type is updated in place
    /// when it carries the same reason; any other reason starts a new entry.
    /// `now` stamps `lastTransitionTime` on new entries and status changes.
    /// Returns false when the ledger already says exactly this.
    pub fn set(&mut self, mut cond: Condition, now: &str) -> bool {
        let live = self.0.iter().rposition(|c| c.type_ == cond.type_);
        if let Some(existing) = live.and_then(|i| self.0.get_mut(i)) {
            if existing.reason == cond.reason {
                if existing.status == cond.status && existing.message == cond.message {
                    return false;
                }
                if existing.status != cond.status || existing.last_transition_time.is_none() {
                    existing.last_transition_time = Some(now.to_string());
                }
                existing.status = cond.status;
                existing.message = cond.message;
                return true;
            }
        }
        cond.last_transition_time = Some(now.to_string());
        self.0.push(cond);
        true
    }
}

impl From<Vec<Condition>> for Ledger {
    fn from(v: Vec<Condition>) -> Self { Self(v) }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Condition;
    type IntoIter = std::slice::Iter<'a, Condition>;
    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConditionStatus::*;

    const T0: &str = "2024-01-01T00:00:00Z";
    const T1: &str = "2024-01-01T00:00:05Z";

    #[test]
    fn empty_ledger_has_no_state() {
        let l = Ledger::new();
        assert!(l.is_initial());
        assert!(!l.is_state(Reason::Initialized));
        assert!(!l.is_complete(Reason::Initialized));
        assert!(!l.is_incomplete(Reason::Initialized));
        assert!(l.latest(ConditionType::Availability).is_none());
    }

    #[test]
    fn same_reason_replaces_in_place_and_stamps_transition() {
        let mut l = Ledger::new();
        assert!(l.set(Condition::available(Unknown, Reason::Initialized, "starting"), T0));
        assert!(l.is_incomplete(Reason::Initialized));

        assert!(l.set(Condition::available(True, Reason::Initialized, "done"), T1));
        assert_eq!(l.len(), 1);
        assert!(l.is_complete(Reason::Initialized));
        let c = l.current().unwrap();
        assert_eq!(c.message, "done");
        assert_eq!(c.last_transition_time.as_deref(), Some(T1));
    }

    #[test]
    fn identical_set_is_a_no_op() {
        let mut l = Ledger::new();
        l.set(Condition::available(True, Reason::Deployed, "x"), T0);
        assert!(!l.set(Condition::available(True, Reason::Deployed, "x"), T1));
        assert_eq!(l.current().unwrap().last_transition_time.as_deref(), Some(T0));
    }

    #[test]
    fn message_change_keeps_transition_time() {
        let mut l = Ledger::new();
        l.set(Condition::available(True, Reason::Deployed, "x"), T0);
        assert!(l.set(Condition::available(True, Reason::Deployed, "y"), T1));
        assert_eq!(l.current().unwrap().last_transition_time.as_deref(), Some(T0));
    }

    #[test]
    fn new_reason_appends_and_keeps_history() {
        let mut l = Ledger::new();
        l.set(Condition::available(True, Reason::Initialized, "a"), T0);
        l.set(Condition::available(True, Reason::Deployed, "b"), T0);
        l.set(Condition::available(True, Reason::Completed, "c"), T1);
        let reasons: Vec<_> = l.reasons().collect();
        assert_eq!(reasons, vec![Reason::Initialized, Reason::Deployed, Reason::Completed]);
        assert_eq!(l.latest(ConditionType::Availability).unwrap().reason, Reason::Completed);
        assert!(l.is_complete(Reason::Completed));
        assert!(!l.is_state(Reason::Deployed));
    }

    #[test]
    fn latest_is_per_type() {
        let mut l = Ledger::new();
        l.set(Condition::available(True, Reason::Initialized, "a"), T0);
        l.set(Condition::degraded(True, Reason::Finalized, "gone"), T1);
        assert_eq!(l.latest(ConditionType::Availability).unwrap().reason, Reason::Initialized);
        assert_eq!(l.latest(ConditionType::Degradation).unwrap().reason, Reason::Finalized);
        assert!(l.is_complete(Reason::Finalized));
    }

    #[test]
    fn wire_format_uses_kubernetes_names() {
        let c = Condition::available(Unknown, Reason::Initialized, "starting");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "Available");
        assert_eq!(v["status"], "Unknown");
        assert_eq!(v["reason"], "Initialized");
        assert_eq!(v["type"], c.type_.as_str());
        assert_eq!(v["status"], c.status.as_str());

        // the CRD schema enumerates both, so a foreign value never reaches us from the apiserver
        let foreign = serde_json::from_value::<Condition>(serde_json::json!({
            "type": "Progressing", "status": "True", "reason": "SomethingElse", "message": ""
        }));
        assert!(foreign.is_err());
    }
}
