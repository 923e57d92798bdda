//! Domain error model and fault taxonomy.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// How a failure should be handled by retry/report machinery.
///
/// Every error that crosses the claim/report or poll boundary is classified
/// into exactly one of these.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// Worth retrying under the attempt budget (network blip, device busy).
    Transient,
    /// No retry can help (malformed payload, authorization denial).
    Permanent,
    /// A report arrived for a claim that is no longer the claim of record.
    StaleClaim,
    /// A required startup parameter is missing/invalid; the process must not start.
    Configuration,
}

impl FaultKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FaultKind::Transient)
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale claim / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authorization failure at the domain boundary.
    #[error("forbidden")]
    Forbidden,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Map this error into the retry taxonomy.
    pub fn fault_kind(&self) -> FaultKind {
        match self {
            DomainError::Conflict(_) => FaultKind::StaleClaim,
            DomainError::Forbidden
            | DomainError::Validation(_)
            | DomainError::InvariantViolation(_)
            | DomainError::InvalidId(_)
            | DomainError::NotFound => FaultKind::Permanent,
        }
    }
}
