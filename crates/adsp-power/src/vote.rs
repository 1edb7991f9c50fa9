//! Per-voter vote bookkeeping.

use std::time::Instant;

/// Votes cast by one voter. Records live until the manager is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VoteRecord {
    pub up_count: u64,
    pub down_count: u64,
    pub last_up: Option<Instant>,
    pub last_down: Option<Instant>,
    pub wants_power: bool,
}

impl VoteRecord {
    /// Votes cast and not yet released.
    pub fn outstanding(&self) -> u64 {
        self.up_count.saturating_sub(self.down_count)
    }

    pub(crate) fn vote_up(&mut self, now: Instant) {
        self.up_count = self.up_count.saturating_add(1);
        self.last_up = Some(now);
        self.wants_power = true;
    }

    /// Returns `false`, leaving the record untouched, when the release
    /// would outnumber the votes.
    pub(crate) fn vote_down(&mut self, now: Instant) -> bool {
        if self.down_count >= self.up_count {
            return false;
        }
        self.down_count = self.down_count.saturating_add(1);
        self.last_down = Some(now);
        self.wants_power = self.outstanding() > 0;
        true
    }

    /// Undo a `vote_up` whose power-on failed.
    pub(crate) fn retract_up(&mut self) {
        self.up_count = self.up_count.saturating_sub(1);
        self.wants_power = self.outstanding() > 0;
    }
}
