//! Session lifecycle error types.
//!
//! Session ids are carried as raw `u16` values so this crate stays free of
//! protocol types; they are always rendered in `0xCCSS` form.

use crate::common::{ErrorCategory, ErrorSeverity};

/// Errors scoped to a single stream session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A live session already uses this id
    #[error("Session {0:#06x} already exists")]
    Duplicate(u16),

    /// No live session with this id
    #[error("Session {0:#06x} not found")]
    NotFound(u16),

    /// Operation not permitted by the transition table
    #[error("Operation '{op}' is not legal in state {state}")]
    IllegalTransition {
        /// Requested operation
        op: &'static str,
        /// State the session was in
        state: &'static str,
    },

    /// Another request is already outstanding on the session
    #[error("Session {session:#06x} already has '{pending}' in flight")]
    Busy {
        /// Session id
        session: u16,
        /// Operation currently in flight
        pending: &'static str,
    },

    /// No response within the bound
    #[error("'{op}' on session {session:#06x} timed out after {timeout_ms}ms")]
    Timeout {
        /// Session id
        session: u16,
        /// Operation that timed out
        op: &'static str,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// The DSP answered with a non-zero result code
    #[error("DSP rejected '{op}' on session {session:#06x} with result code {code}")]
    PeerFailure {
        /// Session id
        session: u16,
        /// Operation that failed
        op: &'static str,
        /// Result byte from the response frame
        code: u8,
    },

    /// The wait was cut short by a coprocessor fault
    #[error("'{op}' on session {session:#06x} aborted by coprocessor fault")]
    Aborted {
        /// Session id
        session: u16,
        /// Operation that was in flight
        op: &'static str,
    },

    /// Data submitted while the front-end is detached
    #[error("Front-end of session {0:#06x} is not attached")]
    NotAttached(u16),

    /// Shared region has no free block
    #[error("Session {session:#06x} has no room in its shared region ({free} free blocks)")]
    InsufficientSpace {
        /// Session id
        session: u16,
        /// Free blocks at the time of the call
        free: u32,
    },

    /// Registry capacity reached
    #[error("Registry is full ({0} sessions)")]
    ResourceExhausted(usize),

    /// Session must be driven back to Idle first
    #[error("Session {session:#06x} is {state}, expected Idle")]
    NotIdle {
        /// Session id
        session: u16,
        /// Current state
        state: &'static str,
    },
}

impl StreamError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StreamError::Duplicate(_) => ErrorSeverity::Error,
            StreamError::NotFound(_) => ErrorSeverity::Error,
            StreamError::IllegalTransition { .. } => ErrorSeverity::Warning,
            StreamError::Busy { .. } => ErrorSeverity::Warning,
            StreamError::Timeout { .. } => ErrorSeverity::Error,
            StreamError::PeerFailure { .. } => ErrorSeverity::Error,
            StreamError::Aborted { .. } => ErrorSeverity::Error,
            StreamError::NotAttached(_) => ErrorSeverity::Warning,
            StreamError::InsufficientSpace { .. } => ErrorSeverity::Info,
            StreamError::ResourceExhausted(_) => ErrorSeverity::Error,
            StreamError::NotIdle { .. } => ErrorSeverity::Warning,
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            StreamError::Duplicate(_) | StreamError::NotFound(_) => ErrorCategory::InvalidArgument,
            StreamError::IllegalTransition { .. }
            | StreamError::Busy { .. }
            | StreamError::NotAttached(_)
            | StreamError::NotIdle { .. } => ErrorCategory::State,
            StreamError::Timeout { .. } => ErrorCategory::ProtocolTimeout,
            StreamError::PeerFailure { .. } => ErrorCategory::PeerFailure,
            StreamError::Aborted { .. } => ErrorCategory::CoprocessorFault,
            StreamError::InsufficientSpace { .. } | StreamError::ResourceExhausted(_) => {
                ErrorCategory::ResourceExhaustion
            }
        }
    }

    /// Check if re-issuing the same call later might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreamError::Timeout { .. }
                | StreamError::Busy { .. }
                | StreamError::InsufficientSpace { .. }
        )
    }

    /// Create an illegal transition error.
    pub fn illegal(op: &'static str, state: &'static str) -> Self {
        StreamError::IllegalTransition { op, state }
    }

    /// Create a timeout error.
    pub fn timeout(session: u16, op: &'static str, timeout_ms: u64) -> Self {
        StreamError::Timeout {
            session,
            op,
            timeout_ms,
        }
    }

    /// Create a peer failure error.
    pub fn peer_failure(session: u16, op: &'static str, code: u8) -> Self {
        StreamError::PeerFailure { session, op, code }
    }

    /// Create an aborted error.
    pub fn aborted(session: u16, op: &'static str) -> Self {
        StreamError::Aborted { session, op }
    }
}
