use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("message content must not be empty")]
    EmptyContent,

    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store call exceeded {0:?}")]
    Timeout(Duration),

    #[error("storage task failed: {0}")]
    Task(String),
}

impl InsightError {
    /// Input-validation failures are the only errors public entry points
    /// surface to callers; everything else degrades to a neutral default.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidUserId(_) | Self::EmptyContent)
    }
}

macro_rules! storage_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for InsightError {
                fn from(err: $ty) -> Self {
                    Self::Storage(redb::Error::from(err))
                }
            }
        )*
    };
}

storage_from!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl From<tokio::task::JoinError> for InsightError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, InsightError>;
