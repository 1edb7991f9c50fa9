//! Common imports for recovery consumers.

pub use crate::action::{ActionHandle, RecoveryAction};
pub use crate::error::{RecoveryError, RecoveryResult};
pub use crate::orchestrator::{
    RecoveryConfig, RecoveryOrchestrator, RecoveryStatus, RepairService, RepairTicket,
};
pub use crate::reachability::DspReachability;
