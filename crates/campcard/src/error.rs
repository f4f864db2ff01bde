use std::fmt;

/// Failure reported by the issuers and the allocator.
pub enum CodeError {
    /// User, account, code or link is absent (expired keys land here too).
    NotFound(&'static str),
    /// Offer link has already been redeemed `max_uses` times.
    CapacityExceeded { max_uses: u32 },
    /// Email or card number already present in the ledger.
    Conflict(&'static str),
    /// Upstream payment check declined the transaction.
    VerificationFailed(String),
    /// Validation errors - safe to show
    Validation(String),
    /// Internal errors - logged, never shown verbatim to end users
    Internal(anyhow::Error),
}

impl CodeError {
    /// Machine-readable identifier for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            CodeError::NotFound(_) => "not_found",
            CodeError::CapacityExceeded { .. } => "capacity_exceeded",
            CodeError::Conflict(_) => "conflict",
            CodeError::VerificationFailed(_) => "verification_failed",
            CodeError::Validation(_) => "invalid_request",
            CodeError::Internal(_) => "internal_error",
        }
    }
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeError::NotFound(what) => write!(f, "{} not found", what),
            CodeError::CapacityExceeded { max_uses } => {
                write!(f, "link has reached its limit of {} uses", max_uses)
            }
            CodeError::Conflict(what) => write!(f, "{} already exists", what),
            CodeError::VerificationFailed(reason) => {
                write!(f, "payment verification failed: {}", reason)
            }
            CodeError::Validation(msg) => write!(f, "{}", msg),
            CodeError::Internal(_) => write!(f, "internal error"),
        }
    }
}

impl fmt::Debug for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeError::Internal(err) => write!(f, "Internal({:?})", err),
            other => write!(f, "{}", other),
        }
    }
}

impl<E> From<E> for CodeError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
