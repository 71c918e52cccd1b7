use thiserror::Error;

/// Error taxonomy shared by the catalog store, sync coordinator, and both
/// HTTP surfaces.
///
/// `RateLimited` and `SessionInvalid` deliberately share their message
/// wording so a caller probing session ids cannot tell them apart by text;
/// programmatic callers distinguish them via [`CatalogError::code`].
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid session or rate limit exceeded. Please try again later.")]
    RateLimited,

    #[error("Invalid session or rate limit exceeded. Please try again later.")]
    SessionInvalid,

    /// Retryable hiccup: network, storage briefly read-only, etc.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Broken invariant. Must never be swallowed.
    #[error("invariant violation: {0}")]
    Fatal(String),
}

impl CatalogError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::Transient(_) => "TRANSIENT",
            Self::Fatal(_) => "INTERNAL",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }
}
