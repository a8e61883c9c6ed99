use thiserror::Error;

use crate::backend::BackendError;
use crate::compose::ValidationError;

/// Failure of a user-triggered action (like, comment, publish, open post).
///
/// Every variant is surfaced to the user at the boundary of the view that
/// triggered the action; none of them terminate the view. Nothing here is
/// retried automatically.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action needs a signed-in viewer and there is none.
    #[error("Sign in required")]
    Unauthenticated,

    /// Network or data store failure during a fetch or mutation.
    #[error("Remote operation failed: {0}")]
    Remote(#[from] BackendError),

    /// Rejected locally before any remote call was made.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// The requested entity does not exist (or is not visible to the viewer).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The viewer is signed in but may not change this item.
    #[error("Not allowed: {0}")]
    NotAllowed(&'static str),

    /// A previous mutation on the same item has not resolved yet.
    #[error("Previous change is still being saved")]
    Busy,
}

impl ActionError {
    /// True when the user should be prompted to sign in rather than shown an error.
    pub fn needs_sign_in(&self) -> bool {
        matches!(self, ActionError::Unauthenticated)
    }
}
