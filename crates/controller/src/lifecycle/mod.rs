//! Lifecycle state machine of a `Goop`.
//!
//! States are read off the condition ledger, never stored separately:
//!
//! ```text
//! (empty) -> Initialized/Unknown -> Initialized/True -> Deployed -> Completed
//!                  \___________ deletion requested ___________/
//!                                     |
//!                          finalizer removed -> Finalized
//! ```
//!
//! Every mutating step is guarded by a ledger predicate, so a duplicate
//! delivery after the state moved on is a no-op.

mod completion;
mod creation;
mod deletion;
mod finalizer;
mod init;

pub use completion::HandleCompletion;
pub use creation::HandleCreation;
pub use deletion::{FinalizerCleanup, HandleDeletion, NoCleanup};
pub use finalizer::EnsureFinalizer;
pub use init::EnsureInitialization;

use crate::Chain;

/// The lifecycle chain in its required order. Deletion runs before creation
/// and completion so a resource marked for deletion never progresses.
pub fn default_chain() -> Chain {
    Chain::new()
        .with(EnsureInitialization)
        .with(EnsureFinalizer)
        .with(HandleDeletion::new(NoCleanup))
        .with(HandleCreation)
        .with(HandleCompletion)
}
