//! Error taxonomy for control-plane calls.

use thiserror::Error;

/// Result type alias for control-plane operations.
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Errors a control-plane call can fail with.
///
/// Only `Transient` is retryable. `NotFound` and `Other` propagate on the
/// first attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlPlaneError {
    /// Throttling or a transient network/service fault.
    #[error("transient control-plane error in {operation}: {message}")]
    Transient { operation: String, message: String },

    /// The referenced group, configuration, or version does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("control-plane error: {0}")]
    Other(String),
}

impl ControlPlaneError {
    pub fn transient(operation: &str, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// Classification predicate used by the retry policy.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(ControlPlaneError::transient("describe_group", "throttled").is_retryable());
        assert!(!ControlPlaneError::NotFound("group web".to_string()).is_retryable());
        assert!(!ControlPlaneError::Other("access denied".to_string()).is_retryable());
    }

    #[test]
    fn display_includes_operation() {
        let err = ControlPlaneError::transient("start_refresh", "rate exceeded");
        assert_eq!(
            err.to_string(),
            "transient control-plane error in start_refresh: rate exceeded"
        );
    }
}
