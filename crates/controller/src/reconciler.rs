use std::sync::Arc;
use std::time::Instant;

use goop_core::ObjectKey;
use goop_store::ResourceStore;
use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::{lifecycle, Chain, ControllerConfig, PassContext, Requeue, Result};

/// Reconcile entry point: fetch by key, run the chain, report the requeue
/// decision. One pass per call; the dispatcher guarantees a key is never
/// reconciled by two workers at once.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    chain: Chain,
    config: ControllerConfig,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ResourceStore>, config: ControllerConfig) -> Self {
        Self { store, chain: lifecycle::default_chain(), config }
    }

    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    pub fn config(&self) -> &ControllerConfig { &self.config }
    pub fn chain(&self) -> &Chain { &self.chain }

    pub async fn reconcile(&self, key: &ObjectKey, cancel: CancellationToken) -> Result<Requeue> {
        let started = Instant::now();
        let res = self.pass(key, cancel).instrument(info_span!("reconcile", %key)).await;
        histogram!("goop_reconcile_latency_ms", started.elapsed().as_secs_f64() * 1000.0);
        match &res {
            Ok(rq) => {
                let outcome = match rq {
                    Requeue::None => "done",
                    Requeue::Immediate => "requeue",
                    Requeue::After(_) => "requeue_after",
                };
                counter!("goop_reconcile_total", 1u64, "outcome" => outcome);
            }
            Err(e) => {
                counter!("goop_reconcile_total", 1u64, "outcome" => "error");
                counter!("goop_reconcile_errors_total", 1u64, "kind" => e.kind());
            }
        }
        res
    }

    async fn pass(&self, key: &ObjectKey, cancel: CancellationToken) -> Result<Requeue> {
        let mut cx = PassContext::new(key, self.store.as_ref(), &self.config).with_cancel(cancel);
        if let Some(timeout) = self.config.pass_timeout {
            cx = cx.with_deadline(tokio::time::Instant::now() + timeout);
        }
        let goop = match cx.fetch().await {
            Ok(goop) => goop,
            Err(e) if e.is_not_found() => {
                info!("goop resource not found; ignoring since object must be deleted");
                return Ok(Requeue::None);
            }
            Err(e) => return Err(e),
        };
        if self.config.log_objects {
            let dump = serde_json::to_string_pretty(&goop).unwrap_or_default();
            debug!(object = %dump, "fetched goop");
        }
        self.chain.run(&cx, goop).await
    }
}
