//! Global "DSP unreachable" flag.
//!
//! Set when a fault is detected or pre-recovery begins, cleared as the very
//! last step of post-recovery. While set, allocations fail with
//! `Unavailable` and power votes are no-ops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared handle to the unreachable flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct DspReachability {
    unreachable: Arc<AtomicBool>,
}

impl DspReachability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_reachable(&self) -> bool {
        !self.unreachable.load(Ordering::Acquire)
    }

    /// Returns `true` if this call flipped the flag.
    pub fn mark_unreachable(&self) -> bool {
        !self.unreachable.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` if this call flipped the flag.
    pub fn mark_reachable(&self) -> bool {
        self.unreachable.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let a = DspReachability::new();
        let b = a.clone();
        assert!(a.is_reachable());
        assert!(b.mark_unreachable());
        assert!(!b.mark_unreachable());
        assert!(!a.is_reachable());
        assert!(a.mark_reachable());
        assert!(b.is_reachable());
    }
}
