use std::fmt::Display;

use log::error;
use thiserror::Error;

use crate::DatabaseError;

pub type CollabResult<T> = Result<T, CollabError>;

/// Coarse classification of every failure the collab system reports.
/// Adapters map this to their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    Unauthorized,
    Internal,
}

#[derive(Debug, Error)]
pub enum CollabError {
    /// The caller supplied values that can never succeed
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Db(#[from] DatabaseError),
}

impl CollabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Db(e) => e.kind(),
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }
}

/// Helper trait to log internal failures with the operation they happened in
pub(crate) trait LogInternal<T> {
    fn log_internal(self, operation: &str, entity: impl Display) -> CollabResult<T>;
}

impl<T> LogInternal<T> for Result<T, DatabaseError> {
    fn log_internal(self, operation: &str, entity: impl Display) -> CollabResult<T> {
        self.map_err(|e| {
            if e.kind() == ErrorKind::Internal {
                error!("{operation} failed for {entity}: {e}");
            }

            e.into()
        })
    }
}
