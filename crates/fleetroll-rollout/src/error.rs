//! Deployment error types.

use fleetroll_core::ControlPlaneError;
use thiserror::Error;

/// Errors that abort a deployment run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// A transient failure persisted through every retry attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: ControlPlaneError,
    },

    /// A non-retryable control-plane failure (not found, other).
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),
}

impl DeployError {
    /// Wrap the error a retried call finally gave up with.
    pub(crate) fn from_call(operation: &str, attempts: u32, err: ControlPlaneError) -> Self {
        if err.is_retryable() {
            Self::RetriesExhausted {
                operation: operation.to_string(),
                attempts,
                source: err,
            }
        } else {
            Self::ControlPlane(err)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ControlPlane(e) if e.is_not_found())
    }

    /// The underlying control-plane error.
    pub fn control_plane_error(&self) -> &ControlPlaneError {
        match self {
            Self::RetriesExhausted { source, .. } => source,
            Self::ControlPlane(e) => e,
        }
    }
}

pub type DeployResult<T> = Result<T, DeployError>;
