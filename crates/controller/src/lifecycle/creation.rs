use async_trait::async_trait;
use goop_core::{Condition, ConditionStatus, Goop, Reason};
use kube::ResourceExt;
use tracing::info;

use crate::ledger::set_condition;
use crate::workload::descriptor_for;
use crate::{Handler, PassContext, Requeue, Result, Step};

/// Creates the child workload once initialization is complete.
///
/// A workload that already exists while the ledger still says `Initialized`
/// (an earlier pass created it but lost the status write) is adopted by
/// recording `Deployed`, so the resource cannot stall in `Initialized`.
pub struct HandleCreation;

#[async_trait]
impl Handler for HandleCreation {
    fn name(&self) -> &'static str { "handle_creation" }

    async fn handle(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Step> {
        if !goop.ledger().is_complete(Reason::Initialized) {
            return Ok(Step::Continue(goop));
        }
        let name = goop.name_any();
        match cx.call(cx.store.get_workload(cx.key)).await {
            Ok(_) => {
                let deployed = Condition::available(
                    ConditionStatus::True,
                    Reason::Deployed,
                    format!("Daemonset adopted for goop: {name}"),
                );
                let goop = set_condition(cx, goop, deployed).await?;
                Ok(Step::Continue(goop))
            }
            Err(e) if e.is_not_found() => {
                let desc = descriptor_for(&goop, cx.config)?;
                info!(key = %cx.key, image = %desc.image, "creating job daemonset");
                cx.call(cx.store.create_workload(&desc)).await?;
                let deployed = Condition::available(
                    ConditionStatus::True,
                    Reason::Deployed,
                    format!("Daemonset created for goop: {name}"),
                );
                set_condition(cx, goop, deployed).await?;
                info!(key = %cx.key, after = ?cx.config.poll_interval, "requeueing to check for completion");
                Ok(Step::Stop(Requeue::After(cx.config.poll_interval)))
            }
            Err(e) => Err(e),
        }
    }
}
