//! Everything a test usually needs in one import.

pub use crate::dsp::{Script, ScriptedDsp};
pub use crate::must::{must, must_err, must_some, wait_until};
pub use crate::power::MockPowerController;
pub use crate::repair::{ImmediateRepair, ManualRepair};
pub use crate::trace::init_test_tracing;
pub use crate::transport::MockTransport;
