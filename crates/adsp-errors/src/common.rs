//! Top-level error type and classification shared by every crate.

use core::fmt;

use crate::{StreamError, ValidationError};

/// Top-level error that wraps every control-plane failure.
#[derive(Debug, thiserror::Error)]
pub enum AdspError {
    /// Session lifecycle errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Arguments rejected before reaching the wire
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The DSP is unreachable until recovery completes
    #[error("DSP unavailable: {0}")]
    Unavailable(String),

    /// The message channel refused a frame
    #[error("Message channel error: {0}")]
    Channel(String),

    /// A frame could not be encoded or decoded
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Power rail control failed
    #[error("Power error: {0}")]
    Power(String),

    /// Subsystem restart failed
    #[error("Recovery error: {0}")]
    Recovery(String),

    /// Low-latency data pipeline failure
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another error annotated with the operation that produced it
    #[error("{context}: {source}")]
    Context {
        /// Where the error surfaced
        context: ErrorContext,
        /// Underlying error
        source: Box<AdspError>,
    },
}

impl AdspError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AdspError::Stream(e) => e.category(),
            AdspError::Validation(_) => ErrorCategory::InvalidArgument,
            AdspError::Unavailable(_) => ErrorCategory::CoprocessorFault,
            AdspError::Channel(_) => ErrorCategory::Transport,
            AdspError::Protocol(_) => ErrorCategory::Transport,
            AdspError::Power(_) => ErrorCategory::Transport,
            AdspError::Recovery(_) => ErrorCategory::CoprocessorFault,
            AdspError::Pipeline(_) => ErrorCategory::Transport,
            AdspError::Config(_) => ErrorCategory::Config,
            AdspError::Context { source, .. } => source.category(),
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AdspError::Stream(e) => e.severity(),
            AdspError::Validation(e) => e.severity(),
            AdspError::Unavailable(_) => ErrorSeverity::Critical,
            AdspError::Channel(_) => ErrorSeverity::Error,
            AdspError::Protocol(_) => ErrorSeverity::Warning,
            AdspError::Power(_) => ErrorSeverity::Error,
            AdspError::Recovery(_) => ErrorSeverity::Critical,
            AdspError::Pipeline(_) => ErrorSeverity::Error,
            AdspError::Config(_) => ErrorSeverity::Error,
            AdspError::Context { source, .. } => source.severity(),
        }
    }

    /// Whether the failure is local to one session and can be handled by
    /// the caller (re-issue, reset the route, or tear the session down).
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }

    /// Create an unavailable error with a message.
    pub fn unavailable(msg: impl Into<String>) -> Self {
        AdspError::Unavailable(msg.into())
    }

    /// Create a channel error with a message.
    pub fn channel(msg: impl Into<String>) -> Self {
        AdspError::Channel(msg.into())
    }

    /// Create a configuration error with a message.
    pub fn config(msg: impl Into<String>) -> Self {
        AdspError::Config(msg.into())
    }

    /// Strip any context wrappers and return the underlying error.
    pub fn root(&self) -> &AdspError {
        match self {
            AdspError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Borrow the stream error underneath any context wrappers.
    pub fn as_stream(&self) -> Option<&StreamError> {
        match self.root() {
            AdspError::Stream(e) => Some(e),
            _ => None,
        }
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Malformed id, unsupported format, missing argument
    InvalidArgument = 0,
    /// Allocation or capacity failure
    ResourceExhaustion = 1,
    /// No response within the bound
    ProtocolTimeout = 2,
    /// Non-zero result code from the DSP
    PeerFailure = 3,
    /// DSP crashed or is being repaired
    CoprocessorFault = 4,
    /// Operation not legal in the session's current state
    State = 5,
    /// Message channel, codec, power rail or data transport
    Transport = 6,
    /// Configuration errors
    Config = 7,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::InvalidArgument => write!(f, "InvalidArgument"),
            ErrorCategory::ResourceExhaustion => write!(f, "ResourceExhaustion"),
            ErrorCategory::ProtocolTimeout => write!(f, "ProtocolTimeout"),
            ErrorCategory::PeerFailure => write!(f, "PeerFailure"),
            ErrorCategory::CoprocessorFault => write!(f, "CoprocessorFault"),
            ErrorCategory::State => write!(f, "State"),
            ErrorCategory::Transport => write!(f, "Transport"),
            ErrorCategory::Config => write!(f, "Config"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, the DSP is not usable until recovery completes
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Error context information.
///
/// Records the operation and a few key/value pairs (session id, scene,
/// voter) without losing the typed error underneath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// The operation that was being performed
    pub operation: String,
    /// Additional context key-value pairs
    pub context: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            context: Vec::new(),
        }
    }

    /// Add a context key-value pair.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        for (key, value) in &self.context {
            write!(f, ", {key}={value}")?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, ctx: ErrorContext) -> Result<T, AdspError>;

    /// Add context with an operation name.
    fn with_context(self, operation: impl Into<String>) -> Result<T, AdspError>;
}

impl<T, E: Into<AdspError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, ctx: ErrorContext) -> Result<T, AdspError> {
        self.map_err(|e| AdspError::Context {
            context: ctx,
            source: Box::new(e.into()),
        })
    }

    fn with_context(self, operation: impl Into<String>) -> Result<T, AdspError> {
        self.context(ErrorContext::new(operation))
    }
}
