//! Shared transfer region.
//!
//! The region is a ring of `block_count` blocks of `block_size` bytes,
//! allocated outside this crate and shared with the DSP. The core only ever
//! advances the cursor it owns: the write cursor for playback, the read
//! cursor for capture.

use std::sync::Arc;

use adsp_errors::ValidationError;
use adsp_pipeline::DataBlock;
use adsp_protocol::RegionDescriptor;
use parking_lot::Mutex;

/// CPU view of the externally allocated transfer memory.
pub trait RegionMemory: Send + Sync {
    /// Usable size in bytes.
    fn size(&self) -> usize;

    /// Copy `data` in at `offset`.
    fn write(&self, offset: usize, data: &[u8]);

    /// Copy `out.len()` bytes out from `offset`.
    fn read(&self, offset: usize, out: &mut [u8]);

    /// CPU address of byte zero, reported in [`DataBlock::addr`].
    fn cpu_base(&self) -> usize {
        0
    }
}

/// Heap-backed region memory.
#[derive(Debug)]
pub struct HeapRegion {
    bytes: Mutex<Vec<u8>>,
}

impl HeapRegion {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0; size]),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }
}

impl RegionMemory for HeapRegion {
    fn size(&self) -> usize {
        self.bytes.lock().len()
    }

    fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock();
        let end = offset.saturating_add(data.len()).min(bytes.len());
        if let Some(dst) = bytes.get_mut(offset..end) {
            for (d, s) in dst.iter_mut().zip(data) {
                *d = *s;
            }
        }
    }

    fn read(&self, offset: usize, out: &mut [u8]) {
        let bytes = self.bytes.lock();
        let end = offset.saturating_add(out.len()).min(bytes.len());
        if let Some(src) = bytes.get(offset..end) {
            for (o, s) in out.iter_mut().zip(src) {
                *o = *s;
            }
        }
    }
}

/// Head record shared with the DSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionHead {
    pub read_cursor: u32,
    pub write_cursor: u32,
    pub flags: u32,
    /// Length of the final (short) block after a drain.
    pub final_len: u32,
}

impl RegionHead {
    /// Set by drain on the block that ends the stream.
    pub const FLAG_FINAL: u32 = 1 << 0;

    pub fn is_final(&self) -> bool {
        self.flags & Self::FLAG_FINAL != 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A session's view of its transfer region.
#[derive(Clone)]
pub struct SharedRegion {
    descriptor: RegionDescriptor,
    head: RegionHead,
    memory: Arc<dyn RegionMemory>,
}

impl SharedRegion {
    /// # Errors
    ///
    /// Rejects an empty geometry, a ring larger than the cursor range, or
    /// memory smaller than the ring.
    pub fn new(
        descriptor: RegionDescriptor,
        memory: Arc<dyn RegionMemory>,
    ) -> Result<Self, ValidationError> {
        if descriptor.block_size == 0 {
            return Err(ValidationError::out_of_range(
                "block_size",
                0,
                1,
                u32::MAX,
            ));
        }
        if descriptor.block_count == 0 {
            return Err(ValidationError::out_of_range(
                "block_count",
                0,
                1,
                u32::MAX,
            ));
        }
        let total = descriptor.total_bytes();
        if total > u64::from(u32::MAX) {
            return Err(ValidationError::out_of_range(
                "region_bytes",
                total,
                1,
                u64::from(u32::MAX),
            ));
        }
        let available = u64::try_from(memory.size()).unwrap_or(u64::MAX);
        if available < total {
            return Err(ValidationError::out_of_range(
                "region_memory",
                available,
                total,
                u64::from(u32::MAX),
            ));
        }
        Ok(Self {
            descriptor,
            head: RegionHead::default(),
            memory,
        })
    }

    pub fn descriptor(&self) -> RegionDescriptor {
        self.descriptor
    }

    pub fn head(&self) -> RegionHead {
        self.head
    }

    pub fn block_size(&self) -> u32 {
        self.descriptor.block_size
    }

    pub fn block_count(&self) -> u32 {
        self.descriptor.block_count
    }

    fn ring_bytes(&self) -> u32 {
        self.descriptor.block_size * self.descriptor.block_count
    }

    pub fn reset_cursors(&mut self) {
        self.head.reset();
    }

    /// Descriptor of the block starting at ring offset `offset`.
    pub fn block_at(&self, offset: u32, len: u32) -> DataBlock {
        DataBlock::new(
            self.memory.cpu_base() + offset as usize,
            self.descriptor.base + u64::from(offset),
            len,
        )
    }

    /// Copy one block (at most `block_size` bytes) in at the write cursor
    /// and advance it by a whole block.
    pub fn commit_block(&mut self, data: &[u8]) -> DataBlock {
        let chunk = data.get(..self.block_size() as usize).unwrap_or(data);
        let offset = self.head.write_cursor;
        self.memory.write(offset as usize, chunk);
        self.head.write_cursor = (offset + self.block_size()) % self.ring_bytes();
        self.block_at(offset, u32::try_from(chunk.len()).unwrap_or(self.block_size()))
    }

    /// Copy captured bytes out of the ring starting at `offset` and move the
    /// read cursor past them. A capture span never crosses a block slot.
    pub fn consume_at(&mut self, offset: u32, out: &mut [u8]) {
        self.memory.read(offset as usize, out);
        let len = u32::try_from(out.len()).unwrap_or(u32::MAX);
        self.head.read_cursor = offset.saturating_add(len) % self.ring_bytes();
    }

    /// Hand the slot at `offset` back: the read cursor moves to the next
    /// slot even if the DSP filled this one only partly.
    pub fn release_slot(&mut self, offset: u32) {
        self.head.read_cursor = offset.saturating_add(self.block_size()) % self.ring_bytes();
    }

    /// Mark the block just committed as the last one.
    pub fn mark_final(&mut self, final_len: u32) {
        self.head.flags |= RegionHead::FLAG_FINAL;
        self.head.final_len = final_len;
    }

    pub fn clear_final(&mut self) {
        self.head.flags &= !RegionHead::FLAG_FINAL;
        self.head.final_len = 0;
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("descriptor", &self.descriptor)
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(block_size: u32, block_count: u32) -> (SharedRegion, Arc<HeapRegion>) {
        let memory = Arc::new(HeapRegion::new((block_size * block_count) as usize));
        let descriptor = RegionDescriptor {
            base: 0x8000_0000,
            block_size,
            block_count,
        };
        match SharedRegion::new(descriptor, memory.clone()) {
            Ok(r) => (r, memory),
            Err(e) => panic!("valid region rejected: {e}"),
        }
    }

    #[test]
    fn commit_wraps_write_cursor() {
        let (mut r, memory) = region(4, 2);
        let a = r.commit_block(&[1, 2, 3, 4]);
        let b = r.commit_block(&[5, 6, 7, 8]);
        assert_eq!((a.phys, b.phys), (0x8000_0000, 0x8000_0004));
        assert_eq!(r.head().write_cursor, 0);
        assert_eq!(memory.to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn short_block_keeps_block_stride() {
        let (mut r, _) = region(4, 4);
        let block = r.commit_block(&[9, 9]);
        assert_eq!(block.len, 2);
        assert_eq!(r.head().write_cursor, 4);
    }

    #[test]
    fn consume_at_tracks_read_cursor() {
        let (mut r, memory) = region(4, 2);
        memory.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut out = [0u8; 3];
        r.consume_at(4, &mut out);
        assert_eq!(out, [5, 6, 7]);
        assert_eq!(r.head().read_cursor, 7);

        r.release_slot(4);
        assert_eq!(r.head().read_cursor, 0);
        r.release_slot(0);
        assert_eq!(r.head().read_cursor, 4);
    }

    #[test]
    fn final_flag_round_trip() {
        let (mut r, _) = region(4, 2);
        r.mark_final(3);
        assert!(r.head().is_final());
        assert_eq!(r.head().final_len, 3);
        r.clear_final();
        assert_eq!(r.head(), RegionHead::default());
    }

    #[test]
    fn undersized_memory_rejected() {
        let descriptor = RegionDescriptor {
            base: 0,
            block_size: 64,
            block_count: 4,
        };
        let result = SharedRegion::new(descriptor, Arc::new(HeapRegion::new(100)));
        assert!(matches!(result, Err(ValidationError::OutOfRange { .. })));
    }
}
