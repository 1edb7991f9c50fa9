//! Block descriptors and the per-session FIFO.

use std::collections::VecDeque;

use parking_lot::Mutex;

/// One slice of the shared transfer region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DataBlock {
    /// CPU-side address
    pub addr: usize,
    /// Device-side address
    pub phys: u64,
    pub len: u32,
}

impl DataBlock {
    pub const fn new(addr: usize, phys: u64, len: u32) -> Self {
        Self { addr, phys, len }
    }

    /// Zero-length block primed ahead of real data when a stream starts.
    /// It is submitted like any other block but never reported.
    pub const fn start_marker(addr: usize, phys: u64) -> Self {
        Self { addr, phys, len: 0 }
    }

    pub const fn is_marker(&self) -> bool {
        self.len == 0
    }
}

/// FIFO of blocks with O(1) put and take under its own lock.
#[derive(Debug, Default)]
pub struct BlockQueue {
    blocks: Mutex<VecDeque<DataBlock>>,
}

impl BlockQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            blocks: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn put(&self, block: DataBlock) {
        self.blocks.lock().push_back(block);
    }

    pub fn take(&self) -> Option<DataBlock> {
        self.blocks.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }

    /// Drop every queued block, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut blocks = self.blocks.lock();
        let n = blocks.len();
        blocks.clear();
        n
    }
}
