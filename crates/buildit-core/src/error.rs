//! Error types for BuildIt.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    /// The action is not legal for the target's current status.
    #[error("invalid action: {0}")]
    InvalidAction(String),

    /// A concurrent action already superseded the target.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Rejections the caller can recover from by refreshing its view.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::InvalidAction(_) | Error::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
