//! Persisting half of the condition ledger.

use chrono::SecondsFormat;
use goop_core::{Condition, Goop};
use tracing::{debug, info};

use crate::{PassContext, Result};

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Record `cond` in the resource's ledger, write the status sub-object and
/// re-read the resource so later handlers work on the store's canonical
/// version (writes against a stale resourceVersion are rejected).
///
/// One status write plus one read; a condition the ledger already holds
/// costs nothing. Store errors are returned as-is, never retried here.
pub async fn set_condition(cx: &PassContext<'_>, mut goop: Goop, cond: Condition) -> Result<Goop> {
    let (type_, status, reason) = (cond.type_, cond.status, cond.reason);
    if !goop.ledger_mut().set(cond, &now()) {
        debug!(key = %cx.key, %reason, "condition unchanged; skipping status write");
        return Ok(goop);
    }
    cx.call(cx.store.update_status(&goop)).await?;
    let fresh = cx.fetch().await?;
    info!(key = %cx.key, ?type_, ?status, %reason, "status condition set");
    Ok(fresh)
}
