//! Goop controller: drives a `Goop` through its lifecycle with an ordered
//! chain of idempotent handlers.
//!
//! A pass fetches the resource, runs the chain until a handler stops it and
//! hands the resulting [`Requeue`] back to the dispatcher. State lives only in
//! the resource's condition ledger, so every pass recomputes from scratch.

#![forbid(unsafe_code)]

pub mod chain;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
mod reconciler;
pub mod workload;

pub use chain::{Chain, Handler, PassContext, Requeue, Step};
pub use config::ControllerConfig;
pub use error::{Error, Result};
pub use reconciler::Reconciler;
