use thiserror::Error;

pub type FanContentResult<T> = Result<T, FanContentError>;

/// Errors from the review/like pipeline.
///
/// Every variant either happens before the store is touched or after a full
/// rollback, so callers never observe partial writes.
#[derive(Debug, Error)]
pub enum FanContentError {
    /// The input was rejected before reaching the database.
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// A referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: usize },

    /// The store is busy or locked, the operation can be retried.
    #[error("Store temporarily unavailable")]
    StoreUnavailable,

    /// An internal invariant was violated, the transaction was rolled back.
    #[error("Consistency violation: {0}")]
    Consistency(String),

    #[error(transparent)]
    Storage(rusqlite::Error),
}

impl From<rusqlite::Error> for FanContentError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::DatabaseBusy
                    || failure.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                FanContentError::StoreUnavailable
            }
            _ => FanContentError::Storage(err),
        }
    }
}
