//! Power vote manager.
//!
//! Votes are reference counts on "keep the DSP powered". The vote table
//! sits under one mutex; the power rail is switched outside it, under a
//! separate transition lock that re-reads the live count, so a concurrent
//! register/unregister pair can never leave the rail in the wrong state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use adsp_protocol::VoterId;
use adsp_recovery::DspReachability;
use parking_lot::Mutex;

use crate::controller::{PowerController, PowerResult};
use crate::vote::VoteRecord;

#[derive(Debug, Default)]
struct VoteTable {
    records: HashMap<VoterId, VoteRecord>,
    live_votes: u64,
}

/// Snapshot of manager counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PowerStats {
    pub live_votes: u64,
    pub voters: usize,
    pub power_on_count: u64,
    pub power_off_count: u64,
    /// Unregisters dropped because the voter had nothing outstanding.
    pub ignored_unregisters: u64,
}

pub struct PowerVoteManager {
    controller: Arc<dyn PowerController>,
    reachability: DspReachability,
    auto_power_off: AtomicBool,
    table: Mutex<VoteTable>,
    transition: Mutex<()>,
    power_on_count: AtomicU64,
    power_off_count: AtomicU64,
    ignored_unregisters: AtomicU64,
}

impl PowerVoteManager {
    pub fn new(
        controller: Arc<dyn PowerController>,
        reachability: DspReachability,
        auto_power_off: bool,
    ) -> Self {
        Self {
            controller,
            reachability,
            auto_power_off: AtomicBool::new(auto_power_off),
            table: Mutex::new(VoteTable::default()),
            transition: Mutex::new(()),
            power_on_count: AtomicU64::new(0),
            power_off_count: AtomicU64::new(0),
            ignored_unregisters: AtomicU64::new(0),
        }
    }

    /// Cast a vote. Powers the DSP on when this is the first live vote.
    ///
    /// No-op while the DSP is unreachable.
    ///
    /// # Errors
    ///
    /// Returns the controller's error if power-on fails; the vote is
    /// retracted in that case.
    pub fn register(&self, voter: VoterId) -> PowerResult<()> {
        if !self.reachability.is_reachable() {
            tracing::debug!(%voter, "vote ignored, DSP unreachable");
            return Ok(());
        }
        let live = {
            let mut table = self.table.lock();
            table.records.entry(voter).or_default().vote_up(Instant::now());
            table.live_votes = table.live_votes.saturating_add(1);
            table.live_votes
        };
        tracing::debug!(%voter, live, "power vote registered");

        if let Err(e) = self.sync_power() {
            let mut table = self.table.lock();
            if let Some(rec) = table.records.get_mut(&voter) {
                rec.retract_up();
            }
            table.live_votes = table.live_votes.saturating_sub(1);
            tracing::warn!(%voter, error = %e, "power-on failed, vote retracted");
            return Err(e);
        }
        Ok(())
    }

    /// Release a vote. Powers the DSP off when the last live vote goes and
    /// auto power-off is enabled.
    ///
    /// Releasing more votes than were cast is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns the controller's error if power-off fails. The vote stays
    /// released.
    pub fn unregister(&self, voter: VoterId) -> PowerResult<()> {
        if !self.reachability.is_reachable() {
            tracing::debug!(%voter, "unvote ignored, DSP unreachable");
            return Ok(());
        }
        let live = {
            let mut table = self.table.lock();
            let released = table
                .records
                .get_mut(&voter)
                .is_some_and(|rec| rec.vote_down(Instant::now()));
            if !released {
                drop(table);
                self.ignored_unregisters.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(%voter, "unregister without matching register ignored");
                return Ok(());
            }
            table.live_votes = table.live_votes.saturating_sub(1);
            table.live_votes
        };
        tracing::debug!(%voter, live, "power vote released");
        self.sync_power()
    }

    /// Bring the rail to the state the live count asks for.
    fn sync_power(&self) -> PowerResult<()> {
        let _transition = self.transition.lock();
        let live = self.table.lock().live_votes;
        let powered = self.controller.is_powered();
        if live > 0 && !powered {
            tracing::info!(live, "powering DSP on");
            self.controller.power_on()?;
            self.power_on_count.fetch_add(1, Ordering::Relaxed);
        } else if live == 0 && powered && self.auto_power_off.load(Ordering::Acquire) {
            tracing::info!("last vote released, powering DSP off");
            self.controller.power_off()?;
            self.power_off_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Power the DSP on if it is off, regardless of votes. Used inline by
    /// data submission.
    ///
    /// # Errors
    ///
    /// Returns the controller's error if power-on fails.
    pub fn ensure_powered(&self) -> PowerResult<()> {
        if self.controller.is_powered() {
            return Ok(());
        }
        let _transition = self.transition.lock();
        if !self.controller.is_powered() {
            tracing::info!("DSP off on data path, powering on");
            self.controller.power_on()?;
            self.power_on_count.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Enable or disable automatic power-off. Enabling with no live votes
    /// powers the DSP off immediately.
    ///
    /// # Errors
    ///
    /// Returns the controller's error if that power-off fails.
    pub fn set_auto_power_off(&self, enabled: bool) -> PowerResult<()> {
        self.auto_power_off.store(enabled, Ordering::Release);
        tracing::info!(enabled, "auto power-off changed");
        if enabled && self.reachability.is_reachable() {
            return self.sync_power();
        }
        Ok(())
    }

    pub fn auto_power_off(&self) -> bool {
        self.auto_power_off.load(Ordering::Acquire)
    }

    /// Forget every vote without touching the rail. Used while the DSP is
    /// down for repair.
    pub fn reset(&self) {
        let mut table = self.table.lock();
        let dropped = table.live_votes;
        table.records.clear();
        table.live_votes = 0;
        tracing::info!(dropped, "power votes reset");
    }

    pub fn live_votes(&self) -> u64 {
        self.table.lock().live_votes
    }

    pub fn record(&self, voter: VoterId) -> Option<VoteRecord> {
        self.table.lock().records.get(&voter).copied()
    }

    pub fn is_powered(&self) -> bool {
        self.controller.is_powered()
    }

    pub fn stats(&self) -> PowerStats {
        let (live_votes, voters) = {
            let table = self.table.lock();
            (table.live_votes, table.records.len())
        };
        PowerStats {
            live_votes,
            voters,
            power_on_count: self.power_on_count.load(Ordering::Relaxed),
            power_off_count: self.power_off_count.load(Ordering::Relaxed),
            ignored_unregisters: self.ignored_unregisters.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for PowerVoteManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerVoteManager")
            .field("stats", &self.stats())
            .field("auto_power_off", &self.auto_power_off())
            .finish()
    }
}
