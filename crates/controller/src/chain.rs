//! Handler chain: an ordered list of reconcile steps run front to back.
//!
//! Each handler gets the resource as left by the previous one and either
//! passes it on ([`Step::Continue`]) or ends the pass ([`Step::Stop`] or an
//! error). New lifecycle phases are added by inserting a handler.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use goop_core::{Goop, ObjectKey};
use goop_store::{ResourceStore, StoreResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{ControllerConfig, Error, Result};

/// What the dispatcher should do with the key after this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// Wait for the next watch event.
    None,
    Immediate,
    After(Duration),
}

#[derive(Debug)]
pub enum Step {
    Continue(Goop),
    Stop(Requeue),
}

/// Per-pass state shared by the handlers: identity, store, configuration and
/// the pass's cancellation signal.
pub struct PassContext<'a> {
    pub key: &'a ObjectKey,
    pub store: &'a dyn ResourceStore,
    pub config: &'a ControllerConfig,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl<'a> PassContext<'a> {
    pub fn new(key: &'a ObjectKey, store: &'a dyn ResourceStore, config: &'a ControllerConfig) -> Self {
        Self { key, store, config, cancel: CancellationToken::new(), deadline: None }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Await a store call unless the pass is cancelled or out of time first.
    /// An aborted call surfaces as an error, never as a partial success.
    pub async fn call<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = expired => Err(Error::DeadlineExceeded),
            res = fut => res.map_err(Error::from),
        }
    }

    /// Read the current copy of the resource under reconciliation.
    pub async fn fetch(&self) -> Result<Goop> {
        self.call(self.store.get(self.key)).await
    }
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Step>;
}

#[derive(Default)]
pub struct Chain {
    handlers: Vec<Box<dyn Handler>>,
}

impl Chain {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, handler: impl Handler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn push(&mut self, handler: impl Handler + 'static) {
        self.handlers.push(Box::new(handler));
    }

    /// Insert `handler` ahead of the handler called `before`; false if absent.
    pub fn insert_before(&mut self, before: &str, handler: impl Handler + 'static) -> bool {
        match self.handlers.iter().position(|h| h.name() == before) {
            Some(i) => {
                self.handlers.insert(i, Box::new(handler));
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize { self.handlers.len() }
    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }

    /// Run handlers in order until one stops or fails. Running off the end
    /// means nothing is left to do until the next event.
    pub async fn run(&self, cx: &PassContext<'_>, goop: Goop) -> Result<Requeue> {
        let mut goop = goop;
        for handler in &self.handlers {
            match handler.handle(cx, goop).await {
                Ok(Step::Continue(next)) => {
                    trace!(handler = handler.name(), "continue");
                    goop = next;
                }
                Ok(Step::Stop(requeue)) => {
                    debug!(handler = handler.name(), ?requeue, "chain stopped");
                    return Ok(requeue);
                }
                Err(e) => {
                    warn!(handler = handler.name(), error = %e, "handler failed");
                    return Err(e);
                }
            }
        }
        Ok(Requeue::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goop_core::GoopSpec;
    use goop_store::{MemStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Probe {
        name: &'static str,
        hits: Arc<AtomicUsize>,
        result: fn() -> Result<Option<Requeue>>,
    }

    #[async_trait]
    impl Handler for Probe {
        fn name(&self) -> &'static str { self.name }

        async fn handle(&self, _cx: &PassContext<'_>, goop: Goop) -> Result<Step> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            Ok(match (self.result)()? {
                Some(rq) => Step::Stop(rq),
                None => Step::Continue(goop),
            })
        }
    }

    fn probe(name: &'static str, hits: &Arc<AtomicUsize>, result: fn() -> Result<Option<Requeue>>) -> Probe {
        Probe { name, hits: hits.clone(), result }
    }

    fn goop() -> Goop { Goop::new("nightly", GoopSpec::default()) }

    #[tokio::test]
    async fn runs_in_order_and_exhausts_to_none() {
        let store = MemStore::new();
        let cfg = ControllerConfig::default();
        let key = ObjectKey::new("jobs", "nightly");
        let cx = PassContext::new(&key, &store, &cfg);
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new().with(probe("a", &hits, || Ok(None))).with(probe("b", &hits, || Ok(None)));
        assert_eq!(chain.run(&cx, goop()).await.unwrap(), Requeue::None);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stop_short_circuits() {
        let store = MemStore::new();
        let cfg = ControllerConfig::default();
        let key = ObjectKey::new("jobs", "nightly");
        let cx = PassContext::new(&key, &store, &cfg);
        let first = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .with(probe("stop", &first, || Ok(Some(Requeue::After(Duration::from_secs(3))))))
            .with(probe("never", &after, || Ok(None)));
        assert_eq!(chain.run(&cx, goop()).await.unwrap(), Requeue::After(Duration::from_secs(3)));
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn error_short_circuits() {
        let store = MemStore::new();
        let cfg = ControllerConfig::default();
        let key = ObjectKey::new("jobs", "nightly");
        let cx = PassContext::new(&key, &store, &cfg);
        let first = Arc::new(AtomicUsize::new(0));
        let after = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .with(probe("fail", &first, || Err(Error::Store(StoreError::Transient("down".into())))))
            .with(probe("never", &after, || Ok(None)));
        assert!(matches!(chain.run(&cx, goop()).await, Err(Error::Store(StoreError::Transient(_)))));
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn insert_before_places_new_phase() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut chain = Chain::new().with(probe("a", &hits, || Ok(None))).with(probe("c", &hits, || Ok(None)));
        assert!(chain.insert_before("c", probe("b", &hits, || Ok(None))));
        assert!(!chain.insert_before("zzz", probe("x", &hits, || Ok(None))));
        assert_eq!(chain.names(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn cancelled_pass_rejects_store_calls() {
        let store = MemStore::new();
        let cfg = ControllerConfig::default();
        let key = ObjectKey::new("jobs", "nightly");
        let token = CancellationToken::new();
        token.cancel();
        let cx = PassContext::new(&key, &store, &cfg).with_cancel(token);
        assert!(matches!(cx.fetch().await, Err(Error::Cancelled)));
        assert_eq!(store.calls(goop_store::Op::Get), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_store_call_hits_deadline() {
        let store = MemStore::new().with_latency(Duration::from_secs(10));
        let cfg = ControllerConfig::default();
        let key = ObjectKey::new("jobs", "nightly");
        let cx = PassContext::new(&key, &store, &cfg).with_deadline(Instant::now() + Duration::from_secs(1));
        assert!(matches!(cx.fetch().await, Err(Error::DeadlineExceeded)));
    }
}
