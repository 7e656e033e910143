//! Error types
//!
//! Backend-facing error taxonomy plus the shared message constants used by
//! the lifecycle dispatchers.

use thiserror::Error;

/// Errors produced by the backend facade.
#[derive(Debug, Error)]
pub enum VcdError {
    /// The remote entity does not exist (or is not visible to this session).
    #[error("[ENF] entity not found: {0}")]
    NotFound(String),

    /// The backend rejected the request.
    #[error("API request failed: {status} - {message}")]
    Api { status: u16, message: String },

    /// An asynchronous backend task finished in error.
    #[error("task {task} failed: {message}")]
    TaskFailed { task: String, message: String },

    /// A bounded wait ran out.
    #[error("timed out after {0}s waiting for {1}")]
    Timeout(u64, String),

    /// The host cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Login or token exchange failed.
    #[error("authentication failed: {0}")]
    Auth(String),
}

impl VcdError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

/// Check whether an error chain carries the not-found sentinel.
pub fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<VcdError>(), Some(VcdError::NotFound(_))))
}

/// Check whether an error chain is a host cancellation.
pub fn is_cancelled(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<VcdError>(), Some(VcdError::Cancelled)))
}

pub const ERR_ORG_NOT_FOUND: &str = "organization not found";
pub const ERR_VDC_NOT_FOUND: &str = "VDC not found";
pub const ERR_EDGE_NOT_FOUND: &str = "edge gateway not found";
pub const ERR_EMPTY_ORG: &str =
    "empty organization name provided: set `org` on the resource or on the provider";
pub const ERR_EMPTY_VDC: &str =
    "empty VDC name provided: set `vdc` on the resource or on the provider";

/// Prefix of errors raised when a resource reads an entity of another kind.
pub const ERR_KIND_MISMATCH: &str = "kind mismatch";

/// Substring the backend reports when it refuses to create a disabled org.
pub const DISABLED_ORG_FAILURE_SIGNATURE: &str = "OrgOidcConfigModel";
