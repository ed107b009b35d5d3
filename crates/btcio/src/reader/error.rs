use thiserror::Error;

use super::source::ChainSourceError;

/// Error type for a single tracker step.
///
/// A step that fails leaves the window and the last observed hash untouched.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Fetching from the chain source failed.
    #[error("chain source: {0}")]
    Source(#[from] ChainSourceError),

    /// The step was cancelled before it committed anything.
    #[error("step cancelled")]
    Cancelled,
}

impl TrackerError {
    /// Returns true if the step can simply be retried on the next poll.
    pub fn is_recoverable(&self) -> bool {
        match self {
            TrackerError::Source(_) => true,
            // Only raised while shutting down.
            TrackerError::Cancelled => false,
        }
    }
}

pub(crate) type Result<T> = std::result::Result<T, TrackerError>;
