//! Subsystem restart (SSR) orchestration.
//!
//! A cycle is `pre_recovery` (mark unreachable, run pre hooks in
//! registration order, request repair and wait for confirmation) followed
//! by `post_recovery` (run post hooks in registration order, mark reachable
//! last). The action list is guarded by one mutex which is never held while
//! a hook runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::action::{ActionHandle, RecoveryAction};
use crate::error::{RecoveryError, RecoveryResult};
use crate::reachability::DspReachability;

/// Recovery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Bound on the repair confirmation wait. Expiry is fatal.
    pub repair_timeout: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            repair_timeout: Duration::from_secs(10),
        }
    }
}

impl RecoveryConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the repair timeout is zero.
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.repair_timeout.is_zero() {
            return Err(RecoveryError::InvalidConfig(
                "repair_timeout must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome reported through a [`RepairTicket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    Repaired,
    Failed(String),
}

/// One-shot confirmation handle handed to the repair service. Confirm from
/// any thread once the firmware is back.
#[derive(Debug)]
pub struct RepairTicket {
    ssr_id: u64,
    tx: Sender<RepairOutcome>,
}

impl RepairTicket {
    /// Build a ticket and the receiver its outcome arrives on.
    pub fn new(ssr_id: u64) -> (Self, channel::Receiver<RepairOutcome>) {
        let (tx, rx) = channel::bounded(1);
        (Self { ssr_id, tx }, rx)
    }

    pub fn ssr_id(&self) -> u64 {
        self.ssr_id
    }

    pub fn confirm(self) {
        if self.tx.send(RepairOutcome::Repaired).is_err() {
            tracing::warn!(ssr_id = self.ssr_id, "repair confirmed after the orchestrator gave up");
        }
    }

    pub fn fail(self, reason: impl Into<String>) {
        if self.tx.send(RepairOutcome::Failed(reason.into())).is_err() {
            tracing::warn!(ssr_id = self.ssr_id, "repair failure reported after the orchestrator gave up");
        }
    }
}

/// External subsystem repair (firmware reload).
pub trait RepairService: Send + Sync {
    /// Begin repair. The service owns the ticket and resolves it later; it
    /// must not block until repair completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued at all.
    fn request_repair(&self, ticket: RepairTicket) -> RecoveryResult<()>;
}

/// Orchestrator progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// No cycle in progress.
    Idle,
    /// Running pre-recovery hooks.
    Quiescing,
    /// Waiting for the repair service.
    AwaitingRepair,
    /// Repair confirmed, post-recovery pending.
    Repaired,
    /// Running post-recovery hooks.
    Resuming,
    /// Repair failed or timed out; DSP unreachable.
    Failed,
}

impl RecoveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryStatus::Idle => "idle",
            RecoveryStatus::Quiescing => "quiescing",
            RecoveryStatus::AwaitingRepair => "awaiting_repair",
            RecoveryStatus::Repaired => "repaired",
            RecoveryStatus::Resuming => "resuming",
            RecoveryStatus::Failed => "failed",
        }
    }
}

/// Snapshot of orchestrator counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoveryStats {
    /// Completed cycles.
    pub ssr_count: u64,
    /// Cycles whose repair failed or timed out.
    pub failed_count: u64,
    pub registered_actions: usize,
    /// Duration of the last completed cycle.
    pub last_duration: Option<Duration>,
}

/// Supervises the registered recovery actions.
pub struct RecoveryOrchestrator {
    config: RecoveryConfig,
    reachability: DspReachability,
    repair: Arc<dyn RepairService>,
    actions: Mutex<Vec<(ActionHandle, Arc<RecoveryAction>)>>,
    next_handle: AtomicU64,
    status: Mutex<RecoveryStatus>,
    cycle: Mutex<()>,
    started_at: Mutex<Option<Instant>>,
    ssr_count: AtomicU64,
    failed_count: AtomicU64,
    last_duration: Mutex<Option<Duration>>,
}

impl RecoveryOrchestrator {
    pub fn new(
        config: RecoveryConfig,
        reachability: DspReachability,
        repair: Arc<dyn RepairService>,
    ) -> Self {
        Self {
            config,
            reachability,
            repair,
            actions: Mutex::new(Vec::new()),
            next_handle: AtomicU64::new(1),
            status: Mutex::new(RecoveryStatus::Idle),
            cycle: Mutex::new(()),
            started_at: Mutex::new(None),
            ssr_count: AtomicU64::new(0),
            failed_count: AtomicU64::new(0),
            last_duration: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn reachability(&self) -> &DspReachability {
        &self.reachability
    }

    /// Append an action; it runs after every action registered before it.
    pub fn register(&self, action: RecoveryAction) -> ActionHandle {
        let handle = ActionHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(action = action.name(), handle = handle.id(), "recovery action registered");
        self.actions.lock().push((handle, Arc::new(action)));
        handle
    }

    /// Returns `false` if the handle was not registered.
    pub fn unregister(&self, handle: ActionHandle) -> bool {
        let mut actions = self.actions.lock();
        let before = actions.len();
        actions.retain(|(h, _)| *h != handle);
        before != actions.len()
    }

    pub fn action_count(&self) -> usize {
        self.actions.lock().len()
    }

    pub fn status(&self) -> RecoveryStatus {
        *self.status.lock()
    }

    pub fn stats(&self) -> RecoveryStats {
        RecoveryStats {
            ssr_count: self.ssr_count.load(Ordering::Relaxed),
            failed_count: self.failed_count.load(Ordering::Relaxed),
            registered_actions: self.action_count(),
            last_duration: *self.last_duration.lock(),
        }
    }

    fn snapshot(&self) -> Vec<Arc<RecoveryAction>> {
        self.actions.lock().iter().map(|(_, a)| Arc::clone(a)).collect()
    }

    fn set_status(&self, status: RecoveryStatus) {
        *self.status.lock() = status;
    }

    /// Quiesce and wait for repair. Serialized with [`Self::recover`] and
    /// [`Self::post_recovery`].
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the repair service rejects the request,
    /// reports failure, drops the ticket or does not confirm within
    /// `repair_timeout`. The DSP stays unreachable in every error case.
    pub fn pre_recovery(&self) -> RecoveryResult<()> {
        let _cycle = self.cycle.lock();
        self.quiesce()
    }

    fn quiesce(&self) -> RecoveryResult<()> {
        let started = Instant::now();
        *self.started_at.lock() = Some(started);
        self.reachability.mark_unreachable();
        self.set_status(RecoveryStatus::Quiescing);
        let ssr_id = self
            .ssr_count
            .load(Ordering::Relaxed)
            .wrapping_add(self.failed_count.load(Ordering::Relaxed))
            .wrapping_add(1);
        tracing::info!(ssr_id, "pre-recovery started");

        for action in self.snapshot() {
            tracing::debug!(action = action.name(), "running pre-recovery hook");
            action.run_pre();
        }

        self.set_status(RecoveryStatus::AwaitingRepair);
        let (ticket, rx) = RepairTicket::new(ssr_id);
        if let Err(e) = self.repair.request_repair(ticket) {
            return Err(self.fail(e));
        }

        match rx.recv_timeout(self.config.repair_timeout) {
            Ok(RepairOutcome::Repaired) => {
                tracing::info!(ssr_id, elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX), "repair confirmed");
                self.set_status(RecoveryStatus::Repaired);
                Ok(())
            }
            Ok(RepairOutcome::Failed(reason)) => Err(self.fail(RecoveryError::RepairFailed(reason))),
            Err(RecvTimeoutError::Timeout) => {
                Err(self.fail(RecoveryError::RepairTimeout(self.config.repair_timeout)))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(self.fail(RecoveryError::RepairAbandoned(ssr_id)))
            }
        }
    }

    fn fail(&self, err: RecoveryError) -> RecoveryError {
        tracing::error!(error = %err, "recovery failed, DSP remains unreachable");
        self.failed_count.fetch_add(1, Ordering::Relaxed);
        self.set_status(RecoveryStatus::Failed);
        err
    }

    /// Resume after a confirmed repair. Serialized like
    /// [`Self::pre_recovery`].
    ///
    /// # Errors
    ///
    /// Returns [`RecoveryError::NotInProgress`] unless repair was confirmed.
    pub fn post_recovery(&self) -> RecoveryResult<()> {
        let _cycle = self.cycle.lock();
        self.resume()
    }

    fn resume(&self) -> RecoveryResult<()> {
        {
            let mut status = self.status.lock();
            if *status != RecoveryStatus::Repaired {
                return Err(RecoveryError::NotInProgress);
            }
            *status = RecoveryStatus::Resuming;
        }

        for action in self.snapshot() {
            tracing::debug!(action = action.name(), "running post-recovery hook");
            action.run_post();
        }

        self.ssr_count.fetch_add(1, Ordering::Relaxed);
        if let Some(started) = self.started_at.lock().take() {
            *self.last_duration.lock() = Some(started.elapsed());
        }
        self.set_status(RecoveryStatus::Idle);
        self.reachability.mark_reachable();
        tracing::info!("post-recovery complete, DSP reachable");
        Ok(())
    }

    /// Run a full cycle. Concurrent callers are serialized.
    ///
    /// # Errors
    ///
    /// Propagates the fatal errors of [`Self::pre_recovery`].
    pub fn recover(&self) -> RecoveryResult<()> {
        let _cycle = self.cycle.lock();
        self.quiesce()?;
        self.resume()
    }
}

impl std::fmt::Debug for RecoveryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryOrchestrator")
            .field("config", &self.config)
            .field("status", &self.status())
            .field("actions", &self.action_count())
            .finish()
    }
}
