//! Fault handling and the core's own recovery action.

use std::sync::Weak;

use adsp_errors::Result;
use adsp_recovery::{RecoveryAction, RecoveryStatus};

use crate::context::{AudioCore, CoreInner, Counters};

/// Name of the action registered by every [`AudioCore`].
pub const CORE_ACTION: &str = "audio-core";

pub(crate) fn builtin_action(core: Weak<CoreInner>) -> RecoveryAction {
    let pre = core.clone();
    RecoveryAction::new(CORE_ACTION)
        .on_pre(move || {
            if let Some(core) = pre.upgrade() {
                core.quiesce();
            }
        })
        .on_post(move || {
            if let Some(core) = core.upgrade() {
                core.resurrect();
            }
        })
}

impl CoreInner {
    /// Fail every in-flight request immediately. Returns how many waiters
    /// were released.
    pub(crate) fn abort_all_pending(&self) -> usize {
        let mut aborted = 0;
        for session in self.registry.sessions() {
            if session.abort_pending() {
                aborted += 1;
            }
        }
        let global = self.global_pending.lock().take();
        if let Some(op) = global {
            op.abort();
            aborted += 1;
        }
        aborted
    }

    /// Pre-recovery: nothing may wait on the dead DSP or keep moving blocks.
    pub(crate) fn quiesce(&self) {
        let aborted = self.abort_all_pending();
        for session in self.registry.sessions() {
            session.disable_work();
        }
        self.power.reset();
        tracing::info!(aborted, "sessions quiesced for recovery");
    }

    /// Post-recovery: a session still active here was never shut down by
    /// its owner.
    pub(crate) fn resurrect(&self) {
        for session in self.registry.sessions() {
            let state = session.state();
            if session.is_active() || state.is_active() {
                tracing::error!(
                    session_id = %session.id(),
                    state = %state,
                    "session still active after recovery, forcing idle"
                );
                self.registry.idle(&session);
            }
        }
    }

    /// Mark the DSP unreachable and release every waiter. Listeners run
    /// only on the reachable-to-unreachable edge.
    pub(crate) fn handle_fault(&self, reason: u32) {
        Counters::bump(&self.counters.faults);
        let newly = self.reachability.mark_unreachable();
        tracing::error!(reason, first_report = newly, "DSP fault reported");
        let aborted = self.abort_all_pending();
        for session in self.registry.sessions() {
            session.disable_work();
        }
        tracing::debug!(aborted, "in-flight requests aborted");
        if newly {
            let listeners = self.fault_listeners.lock().clone();
            for listener in listeners {
                listener(reason);
            }
        }
    }
}

impl AudioCore {
    /// Report a fault detected outside the message channel (watchdog,
    /// crash interrupt).
    pub fn report_fault(&self, reason: u32) {
        self.inner.handle_fault(reason);
    }

    /// Register a listener for DSP faults.
    pub fn on_fault(&self, listener: impl Fn(u32) + Send + Sync + 'static) {
        self.inner.fault_listeners.lock().push(std::sync::Arc::new(listener));
    }

    /// Run a full recovery cycle: quiesce, repair, resurrect.
    ///
    /// # Errors
    ///
    /// Returns the orchestrator's fatal error if repair fails or times out;
    /// the DSP stays unreachable in that case.
    pub fn recover(&self) -> Result<()> {
        self.inner.orchestrator.recover()?;
        Ok(())
    }

    /// First half of [`Self::recover`], for callers driving the phases
    /// themselves.
    ///
    /// # Errors
    ///
    /// As [`Self::recover`].
    pub fn pre_recovery(&self) -> Result<()> {
        self.inner.orchestrator.pre_recovery()?;
        Ok(())
    }

    /// # Errors
    ///
    /// Fails unless repair has been confirmed.
    pub fn post_recovery(&self) -> Result<()> {
        self.inner.orchestrator.post_recovery()?;
        Ok(())
    }

    pub fn recovery_status(&self) -> RecoveryStatus {
        self.inner.orchestrator.status()
    }
}
