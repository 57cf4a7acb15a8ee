use async_trait::async_trait;
use goop_core::{Condition, ConditionStatus, Goop, Reason};
use kube::ResourceExt;
use tracing::{info, warn};

use crate::ledger::set_condition;
use crate::{Error, Handler, PassContext, Requeue, Result, Step};

/// Polls the deployed workload and records `Completed` once every desired
/// replica is ready and available.
pub struct HandleCompletion;

#[async_trait]
impl Handler for HandleCompletion {
    fn name(&self) -> &'static str { "handle_completion" }

    async fn handle(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Step> {
        if !goop.ledger().is_complete(Reason::Deployed) {
            return Ok(Step::Continue(goop));
        }
        let workload = match cx.call(cx.store.get_workload(cx.key)).await {
            Ok(w) => w,
            Err(e) if e.is_not_found() => {
                // surface the loss in status too; repeat passes find the condition unchanged
                let message = format!("Daemonset for goop {} is missing", goop.name_any());
                warn!(key = %cx.key, "deployed goop has no workload");
                set_condition(cx, goop, Condition::degraded(ConditionStatus::True, Reason::Deployed, message)).await?;
                return Err(Error::MissingWorkload(cx.key.clone()));
            }
            Err(e) => return Err(e),
        };
        if !workload.is_complete() {
            info!(
                key = %cx.key,
                desired = workload.desired,
                ready = workload.ready,
                available = workload.available,
                "waiting for job completion"
            );
            return Ok(Step::Stop(Requeue::After(cx.config.poll_interval)));
        }
        let message = format!("Daemonset for goop completed successfully: {}", goop.name_any());
        let goop = set_condition(cx, goop, Condition::available(ConditionStatus::True, Reason::Completed, message)).await?;
        Ok(Step::Continue(goop))
    }
}
