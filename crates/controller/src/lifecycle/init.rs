use async_trait::async_trait;
use goop_core::{Condition, ConditionStatus, Goop, Reason};
use tracing::info;

use crate::ledger::set_condition;
use crate::{Handler, PassContext, Requeue, Result, Step};

/// Seeds an empty ledger with `Initialized/Unknown`.
pub struct EnsureInitialization;

#[async_trait]
impl Handler for EnsureInitialization {
    fn name(&self) -> &'static str { "ensure_initialization" }

    async fn handle(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Step> {
        if !goop.ledger().is_initial() {
            return Ok(Step::Continue(goop));
        }
        let goop = set_condition(
            cx,
            goop,
            Condition::available(ConditionStatus::Unknown, Reason::Initialized, "Starting reconciliation"),
        )
        .await?;
        // the store acknowledged the write but the read-back does not show it yet
        if goop.ledger().is_initial() {
            info!(key = %cx.key, "requeueing until first condition is initialized");
            return Ok(Step::Stop(Requeue::Immediate));
        }
        Ok(Step::Continue(goop))
    }
}
