//! Power rail collaborator.

use adsp_errors::AdspError;

/// Power control failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PowerError {
    #[error("Power-on failed: {0}")]
    PowerOnFailed(String),

    #[error("Power-off failed: {0}")]
    PowerOffFailed(String),
}

/// Result type for power operations.
pub type PowerResult<T> = Result<T, PowerError>;

impl From<PowerError> for AdspError {
    fn from(e: PowerError) -> Self {
        AdspError::Power(e.to_string())
    }
}

/// Switches the DSP power rail and boots or halts the firmware.
pub trait PowerController: Send + Sync {
    /// Power the DSP up and wait until it can take frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the rail or the boot sequence fails.
    fn power_on(&self) -> PowerResult<()>;

    /// Power the DSP down.
    ///
    /// # Errors
    ///
    /// Returns an error if the rail cannot be switched off.
    fn power_off(&self) -> PowerResult<()>;

    fn is_powered(&self) -> bool;
}
