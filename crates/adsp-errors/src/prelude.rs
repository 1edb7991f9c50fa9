//! Prelude module for convenient error handling imports.
//!
//! # Example
//!
//! ```
//! use adsp_errors::prelude::*;
//!
//! fn lookup(id: u16) -> Result<()> {
//!     Err(StreamError::NotFound(id).into())
//! }
//!
//! assert!(lookup(0x0100).is_err());
//! ```

pub use crate::{
    Result,
    common::{AdspError, ErrorCategory, ErrorContext, ErrorSeverity, ResultExt},
    stream::StreamError,
    validation::ValidationError,
};
