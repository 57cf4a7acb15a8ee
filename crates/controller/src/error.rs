use goop_core::{KeyError, ObjectKey};
use goop_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The resource is in a state the handler guards should have excluded.
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("child workload {0} is missing although the goop is deployed")]
    MissingWorkload(ObjectKey),
    #[error("configuration: {0}")]
    Config(String),
    #[error("reconcile pass cancelled")]
    Cancelled,
    #[error("reconcile pass deadline exceeded")]
    DeadlineExceeded,
}

impl From<KeyError> for Error {
    fn from(e: KeyError) -> Self { Error::Precondition(e.to_string()) }
}

impl Error {
    pub fn is_not_found(&self) -> bool { matches!(self, Error::Store(e) if e.is_not_found()) }
    pub fn is_conflict(&self) -> bool { matches!(self, Error::Store(e) if e.is_conflict()) }

    /// Metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Store(e) => e.kind(),
            Error::Precondition(_) => "precondition",
            Error::MissingWorkload(_) => "missing_workload",
            Error::Config(_) => "config",
            Error::Cancelled => "cancelled",
            Error::DeadlineExceeded => "deadline",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
