//! Repair services for recovery tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use adsp_recovery::{RecoveryError, RecoveryResult, RepairService, RepairTicket};
use parking_lot::Mutex;

/// Confirms every ticket on the spot.
#[derive(Debug, Default)]
pub struct ImmediateRepair {
    requests: AtomicU32,
}

impl ImmediateRepair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

impl RepairService for ImmediateRepair {
    fn request_repair(&self, ticket: RepairTicket) -> RecoveryResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        ticket.confirm();
        Ok(())
    }
}

/// Holds tickets until the test resolves them.
#[derive(Debug, Default)]
pub struct ManualRepair {
    tickets: Mutex<VecDeque<RepairTicket>>,
    reject: Mutex<Option<String>>,
}

impl ManualRepair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every request with `reason`.
    pub fn reject_with(&self, reason: impl Into<String>) {
        *self.reject.lock() = Some(reason.into());
    }

    pub fn pending(&self) -> usize {
        self.tickets.lock().len()
    }

    /// Confirm the oldest outstanding ticket. Returns false if none.
    pub fn confirm_next(&self) -> bool {
        match self.tickets.lock().pop_front() {
            Some(ticket) => {
                ticket.confirm();
                true
            }
            None => false,
        }
    }

    /// Fail the oldest outstanding ticket. Returns false if none.
    pub fn fail_next(&self, reason: &str) -> bool {
        match self.tickets.lock().pop_front() {
            Some(ticket) => {
                ticket.fail(reason);
                true
            }
            None => false,
        }
    }
}

impl RepairService for ManualRepair {
    fn request_repair(&self, ticket: RepairTicket) -> RecoveryResult<()> {
        if let Some(reason) = self.reject.lock().clone() {
            return Err(RecoveryError::RequestRejected(reason));
        }
        self.tickets.lock().push_back(ticket);
        Ok(())
    }
}
