//! Recovery error types.

use std::time::Duration;

use adsp_errors::AdspError;

/// Recovery error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoveryError {
    /// Repair was not confirmed in time. The DSP stays unreachable.
    #[error("Repair not confirmed within {0:?}")]
    RepairTimeout(Duration),

    /// The repair service reported failure.
    #[error("Repair failed: {0}")]
    RepairFailed(String),

    /// The repair ticket was dropped without an outcome.
    #[error("Repair ticket {0} dropped without confirmation")]
    RepairAbandoned(u64),

    /// The repair service refused the request.
    #[error("Repair request rejected: {0}")]
    RequestRejected(String),

    /// Post-recovery requested while no cycle is in progress.
    #[error("No recovery in progress")]
    NotInProgress,

    /// Invalid configuration.
    #[error("Invalid recovery configuration: {0}")]
    InvalidConfig(String),
}

impl RecoveryError {
    /// Whether the DSP is left permanently unreachable until another cycle.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RecoveryError::RepairTimeout(_)
                | RecoveryError::RepairFailed(_)
                | RecoveryError::RepairAbandoned(_)
                | RecoveryError::RequestRejected(_)
        )
    }
}

/// Result type for recovery operations.
pub type RecoveryResult<T> = Result<T, RecoveryError>;

impl From<RecoveryError> for AdspError {
    fn from(e: RecoveryError) -> Self {
        match e {
            RecoveryError::InvalidConfig(msg) => AdspError::Config(msg),
            other => AdspError::Recovery(other.to_string()),
        }
    }
}
