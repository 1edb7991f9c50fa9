//! Low-latency transfer hardware collaborator.

use crate::block::DataBlock;
use crate::error::PipelineResult;

/// Device-side FIFO the workers feed or drain.
pub trait BlockTransport: Send + Sync {
    /// Free slots (playback) or ready blocks (capture) on the device side.
    fn capacity(&self) -> usize;

    /// Hand a playback block to the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejects the block.
    fn submit(&self, block: &DataBlock) -> PipelineResult<()>;

    /// Fill a capture block. Returns the bytes written; zero or negative
    /// means nothing was ready and the block is discarded.
    fn fill(&self, block: &DataBlock) -> isize;
}
