use async_trait::async_trait;
use goop_core::{Condition, ConditionStatus, Goop, Reason};
use tracing::info;

use crate::ledger::set_condition;
use crate::{Handler, PassContext, Result, Step};

/// Attaches the finalizer token while initializing, then marks
/// initialization complete.
///
/// The child workload is removed by owner-reference cascade, so the
/// finalizer only exists to give deletion a hook
/// (see [`FinalizerCleanup`](super::FinalizerCleanup)).
pub struct EnsureFinalizer;

#[async_trait]
impl Handler for EnsureFinalizer {
    fn name(&self) -> &'static str { "ensure_finalizer" }

    async fn handle(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Step> {
        let token = cx.config.finalizer.as_str();
        let mut goop = goop;
        // apiservers refuse new finalizers on an object that is being deleted
        if goop.ledger().is_state(Reason::Initialized) && !goop.has_finalizer(token) && !goop.is_deletion_requested() {
            info!(key = %cx.key, finalizer = token, "adding finalizer");
            goop.add_finalizer(token);
            cx.call(cx.store.update(&goop)).await?;
            goop = cx.fetch().await?;
        }
        if goop.ledger().is_incomplete(Reason::Initialized) {
            goop = set_condition(
                cx,
                goop,
                Condition::available(ConditionStatus::True, Reason::Initialized, "Initialization completed"),
            )
            .await?;
        }
        Ok(Step::Continue(goop))
    }
}
