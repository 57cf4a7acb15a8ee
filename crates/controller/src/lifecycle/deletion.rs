use async_trait::async_trait;
use goop_core::{Condition, ConditionStatus, Goop, Reason};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::ledger::set_condition;
use crate::{Handler, PassContext, Requeue, Result, Step};

/// Work to finish before the finalizer token is released.
#[async_trait]
pub trait FinalizerCleanup: Send + Sync {
    async fn cleanup(&self, cx: &PassContext<'_>, goop: &Goop) -> Result<()>;
}

/// Owned children go away with the owner; nothing else needs releasing.
pub struct NoCleanup;

#[async_trait]
impl FinalizerCleanup for NoCleanup {
    async fn cleanup(&self, _cx: &PassContext<'_>, _goop: &Goop) -> Result<()> { Ok(()) }
}

/// Releases the finalizer once deletion is requested and ends the pass.
/// Runs ahead of creation and completion.
pub struct HandleDeletion<C = NoCleanup> {
    cleanup: C,
}

impl<C: FinalizerCleanup> HandleDeletion<C> {
    pub fn new(cleanup: C) -> Self { Self { cleanup } }
}

#[async_trait]
impl<C: FinalizerCleanup + 'static> Handler for HandleDeletion<C> {
    fn name(&self) -> &'static str { "handle_deletion" }

    async fn handle(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Step> {
        if goop.ledger().is_complete(Reason::Finalized) {
            debug!(key = %cx.key, "already finalized");
            return Ok(Step::Stop(Requeue::None));
        }
        if !goop.is_deletion_requested() {
            return Ok(Step::Continue(goop));
        }

        let token = cx.config.finalizer.as_str();
        if goop.has_finalizer(token) {
            self.cleanup.cleanup(cx, &goop).await?;
            let mut goop = goop;
            goop.remove_finalizer(token);
            cx.call(cx.store.update(&goop)).await?;
            info!(key = %cx.key, "finalizer removed; requeueing for physical deletion");
            return Ok(Step::Stop(Requeue::Immediate));
        }

        // Our token is gone but something else still holds the object.
        let message = format!("Finalization for goop {} completed", goop.name_any());
        match set_condition(cx, goop, Condition::degraded(ConditionStatus::True, Reason::Finalized, message)).await {
            Ok(_) => Ok(Step::Stop(Requeue::None)),
            Err(e) if e.is_not_found() => {
                debug!(key = %cx.key, "deleted while finalizing");
                Ok(Step::Stop(Requeue::None))
            }
            Err(e) => Err(e),
        }
    }
}
