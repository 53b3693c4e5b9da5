use thiserror::Error;

use crate::db::StoreError;
use crate::profiles::ProfileError;

pub type JamResult<T> = std::result::Result<T, JamError>;

/// Errors surfaced to callers of the jam core. The embedding API layer maps
/// these to its transport; nothing is swallowed on the way up.
#[derive(Debug, Error)]
pub enum JamError {
    /// Input has the wrong shape or length
    #[error("invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: &'static str,
    },
    /// The requester is authenticated but is not the session host
    #[error("only the session host may {action}")]
    Forbidden { action: &'static str },
    /// The session or participant doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    /// The session exists but has ended
    #[error("session has ended")]
    Ended,
    /// The session reached its participant cap
    #[error("session is full")]
    Full,
    /// Code generation ran out of attempts. Retryable.
    #[error("could not allocate a unique session code")]
    Conflict,
    /// The profile collaborator failed
    #[error(transparent)]
    Profile(#[from] ProfileError),
    /// Something else went wrong with the store
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for JamError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            e => Self::Store(e),
        }
    }
}
