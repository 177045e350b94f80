//! Error taxonomy for module lifecycle and streaming.
//!
//! Acquisition failures already have a home in
//! [`sherpa_acquire_download::AcquireError`]; this enum adds only the kinds
//! that originate above that boundary — native engine construction, the
//! disposal guard, and precondition checks — and folds an `AcquireError`
//! into itself via `From` rather than duplicating its variants.

use sherpa_acquire_download::AcquireError;
use thiserror::Error;

/// Errors raised while acquiring-and-initializing, disposing, or streaming
/// into a speech module.
#[derive(Debug, Error, Clone)]
pub enum ModuleError {
    /// Acquisition (download/extract/verify) failed; see the wrapped
    /// error's own message for which stage.
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),

    /// A subclass's `initialize` hook failed to construct its native
    /// engine. Resources it partially allocated must already have been
    /// released before this is returned.
    #[error("failed to initialize native engine: {0}")]
    NativeInitError(String),

    /// A public operation was invoked after `dispose` had already run.
    #[error("module has been disposed")]
    DisposedError,

    /// A precondition the caller controls was violated (e.g. an empty model
    /// id, a zero sample rate). Fatal for that call.
    #[error("precondition violated: {0}")]
    PreconditionError(String),

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    OperationCancelled,
}

impl ModuleError {
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::OperationCancelled | Self::Acquisition(AcquireError::Cancelled)
        )
    }

    /// A message suitable for surfacing to an end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Acquisition(err) => err.user_message(),
            Self::OperationCancelled => "Operation cancelled.".into(),
            Self::DisposedError => "This module has already been shut down.".into(),
            other => other.to_string(),
        }
    }
}

pub type ModuleResult<T> = Result<T, ModuleError>;
