// Storage error type.

use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Lock wait exceeded `busy_timeout`. Nothing was written; safe to retry.
    #[error("database is locked by another writer: {0}")]
    Busy(#[source] rusqlite::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    #[error("failed to (de)serialize column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },
}

impl StoreError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => StoreError::Busy(err),
            _ => StoreError::Sqlite(err),
        }
    }
}
