//! Centralized error types for the audio DSP control plane.
//!
//! Every crate in the workspace reports failures through the types defined
//! here, so callers can classify an error without knowing which layer
//! produced it.
//!
//! # Architecture
//!
//! - [`common`]: the top-level [`AdspError`] plus category and severity
//!   classification
//! - [`stream`]: per-session lifecycle failures (timeouts, peer failures,
//!   illegal transitions, busy sessions)
//! - [`validation`]: arguments rejected before anything reaches the wire
//!
//! # Classes
//!
//! | Class | Scope | Recovered by |
//! |-------|-------|--------------|
//! | Invalid argument | one session | caller |
//! | Resource exhaustion | one session | caller |
//! | Protocol timeout | one session | caller |
//! | Peer-reported failure | one session | caller |
//! | Coprocessor fault | global | recovery orchestrator |
//!
//! # Example
//!
//! ```
//! use adsp_errors::prelude::*;
//!
//! fn check_rate(rate: u32) -> Result<u32> {
//!     if rate == 0 {
//!         return Err(ValidationError::unsupported_format("sample_rate", "must be non-zero").into());
//!     }
//!     Ok(rate)
//! }
//!
//! assert!(check_rate(48_000).is_ok());
//! assert_eq!(check_rate(0).unwrap_err().category(), ErrorCategory::InvalidArgument);
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod prelude;
pub mod stream;
pub mod validation;

pub use common::{AdspError, ErrorCategory, ErrorContext, ErrorSeverity, ResultExt};
pub use stream::StreamError;
pub use validation::ValidationError;

/// A specialized `Result` type for control-plane operations.
pub type Result<T> = std::result::Result<T, AdspError>;
