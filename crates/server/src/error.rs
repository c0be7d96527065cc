// Typed error taxonomy for the core components.
//
// Every core operation returns `CoreResult<T>`. Persistence failures are
// never swallowed: rusqlite errors fold into `Storage` via `#[from]` and
// propagate to the caller. The only local recoveries are the idempotent
// no-ops called out per operation (re-binding an active invite, re-marking a
// read notification, re-completing a completed proposal).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// No caller identity resolved. Surfaced as a hard stop at the transport
    /// boundary.
    #[error("caller identity could not be resolved")]
    Unauthenticated,

    /// Caller lacks the required relationship to the target notebook.
    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// Referenced entity does not exist, or is invisible to this caller
    /// (treated identically to avoid leaking existence).
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// A uniqueness invariant would be violated.
    #[error("conflict: {0}")]
    Conflict(&'static str),

    /// Preconditions on entity state are violated (e.g. reviewing a
    /// non-pending proposal).
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Malformed input.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The external summarization/critique oracle errored or timed out.
    /// Always recoverable by retry; never corrupts persisted state.
    #[error("oracle failure: {0}")]
    Oracle(String),

    /// The persistence layer failed.
    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn oracle(message: impl Into<String>) -> Self {
        Self::Oracle(message.into())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::CoreError;

    #[test]
    fn storage_errors_fold_in_from_rusqlite() {
        let err: CoreError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[test]
    fn display_messages_name_the_category() {
        assert_eq!(
            CoreError::Forbidden("only the owner can review changes").to_string(),
            "forbidden: only the owner can review changes"
        );
        assert_eq!(
            CoreError::validation("proposed text must not be empty").to_string(),
            "invalid input: proposed text must not be empty"
        );
    }
}
