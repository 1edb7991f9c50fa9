//! In-memory block transport.

use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};

use adsp_pipeline::{BlockTransport, DataBlock, PipelineError, PipelineResult};
use parking_lot::Mutex;

/// Accepts up to `capacity` blocks and reports `fill_result` for every
/// capture block. Submitted blocks are kept for inspection.
#[derive(Debug)]
pub struct MockTransport {
    capacity: AtomicUsize,
    fill_result: AtomicIsize,
    reject: AtomicBool,
    submitted: Mutex<Vec<DataBlock>>,
    filled: Mutex<Vec<DataBlock>>,
}

impl MockTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: AtomicUsize::new(capacity),
            fill_result: AtomicIsize::new(0),
            reject: AtomicBool::new(false),
            submitted: Mutex::new(Vec::new()),
            filled: Mutex::new(Vec::new()),
        }
    }

    pub fn set_capacity(&self, capacity: usize) {
        self.capacity.store(capacity, Ordering::SeqCst);
    }

    pub fn set_fill_result(&self, bytes: isize) {
        self.fill_result.store(bytes, Ordering::SeqCst);
    }

    pub fn reject_submits(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn submitted(&self) -> Vec<DataBlock> {
        self.submitted.lock().clone()
    }

    pub fn filled(&self) -> Vec<DataBlock> {
        self.filled.lock().clone()
    }
}

impl BlockTransport for MockTransport {
    fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    fn submit(&self, block: &DataBlock) -> PipelineResult<()> {
        if self.reject.load(Ordering::SeqCst) {
            return Err(PipelineError::Transport("submit rejected".into()));
        }
        self.submitted.lock().push(*block);
        if self
            .capacity
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| c.checked_sub(1))
            .is_err()
        {
            tracing::trace!("mock transport submitted past its capacity");
        }
        Ok(())
    }

    fn fill(&self, block: &DataBlock) -> isize {
        self.filled.lock().push(*block);
        self.fill_result.load(Ordering::SeqCst)
    }
}
