//! Produced/released block accounting.
//!
//! Both counters are free-running `u64`s and wrap; comparisons go through
//! the wrapping difference so `released <= produced` holds across a wrap.

/// Block counters for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockCounters {
    produced: u64,
    released: u64,
}

impl BlockCounters {
    pub const fn new() -> Self {
        Self {
            produced: 0,
            released: 0,
        }
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    pub fn released(&self) -> u64 {
        self.released
    }

    /// Blocks produced and not yet released.
    pub fn outstanding(&self) -> u64 {
        self.produced.wrapping_sub(self.released)
    }

    pub fn produce(&mut self, blocks: u64) {
        self.produced = self.produced.wrapping_add(blocks);
    }

    /// Release up to `blocks`, clamped to what is outstanding. Returns the
    /// number actually released.
    pub fn release(&mut self, blocks: u64) -> u64 {
        let n = blocks.min(self.outstanding());
        if n < blocks {
            tracing::warn!(
                requested = blocks,
                outstanding = self.outstanding(),
                "release clamped to outstanding blocks"
            );
        }
        self.released = self.released.wrapping_add(n);
        n
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_clamped() {
        let mut c = BlockCounters::new();
        c.produce(2);
        assert_eq!(c.release(5), 2);
        assert_eq!(c.released(), c.produced());
        assert_eq!(c.release(1), 0);
    }

    #[test]
    fn survives_wrap() {
        let mut c = BlockCounters {
            produced: u64::MAX - 1,
            released: u64::MAX - 1,
        };
        c.produce(4);
        assert_eq!(c.outstanding(), 4);
        assert_eq!(c.release(3), 3);
        assert_eq!(c.outstanding(), 1);
    }
}
