pub mod coordinator;
pub mod external;
pub mod reconcile;
pub mod surface;

pub use coordinator::{RetryPolicy, SyncCoordinator};
pub use external::{ExternalCatalog, ExternalRoom, HttpExternal};
pub use surface::{DisplaySurface, HttpSurface};

use thiserror::Error;

/// Failure classes for outbound calls to display surfaces and the external
/// system of record.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Worth retrying: network trouble, timeouts, remote 5xx.
    #[error("transient: {0}")]
    Transient(String),

    /// Retrying will not help: the remote rejected the payload.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SyncError {
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        if status.is_server_error() || status.as_u16() == 429 {
            Self::Transient(format!("remote returned {status}: {body}"))
        } else {
            Self::Permanent(format!("remote returned {status}: {body}"))
        }
    }
}

pub(crate) fn net_err(e: reqwest::Error) -> SyncError {
    SyncError::Transient(e.to_string())
}
