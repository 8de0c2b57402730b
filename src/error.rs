use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("another engagement run is already in progress")]
    RunInProgress,
}

#[derive(Error, Debug)]
pub enum EngagementError {
    #[error("invalid range: from {from} is after to {to}")]
    InvalidRange {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },

    #[error("a window of {0} days reaches outside the supported time range")]
    WindowOutOfRange(i64),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

