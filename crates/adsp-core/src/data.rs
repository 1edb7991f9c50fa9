//! Data path: block submission, capture reads and completion accounting.
//!
//! Playback writes are cut into whole blocks at the write cursor; a tail
//! shorter than a block is kept as residue until more data arrives or the
//! stream is drained. Ultra-fast scenes hand blocks to the pipeline worker,
//! every other scene tells the DSP about new data with a `DataNotify`.

use adsp_errors::{ErrorContext, Result, ResultExt, StreamError, ValidationError};
use adsp_pipeline::DataBlock;
use adsp_protocol::{Direction, Request};

use crate::context::AudioCore;
use crate::session::{CaptureSpan, Session, SessionInner, StreamEvent};

impl Session {
    /// Queue the blocks a freshly started (or flushed) pipeline needs.
    ///
    /// Playback starts with an empty marker block; capture queues every
    /// block of the ring for the hardware to fill.
    pub(crate) fn prime_pipeline(&self) {
        let blocks: Vec<DataBlock> = {
            let inner = self.lock();
            let Some(region) = inner.region.as_ref() else {
                return;
            };
            match self.direction() {
                Direction::Capture => (0..region.block_count())
                    .map(|i| region.block_at(i * region.block_size(), region.block_size()))
                    .collect(),
                Direction::Playback | Direction::Duplex => {
                    let first = region.block_at(0, 0);
                    vec![DataBlock::start_marker(first.addr, first.phys)]
                }
            }
        };
        self.with_pipeline(|pipeline| {
            for block in blocks {
                pipeline.push(block);
            }
        });
    }

    /// Pipeline worker finished one block.
    pub(crate) fn on_pipeline_block(&self, bytes: u32) {
        match self.direction() {
            Direction::Capture => {
                let block_size = self.lock().region.as_ref().map_or(bytes, |r| r.block_size());
                self.on_captured(bytes.min(block_size));
            }
            Direction::Playback | Direction::Duplex => {
                self.lock().counters.release(1);
                self.emit(StreamEvent::BufferDone { bytes });
            }
        }
    }

    /// `BufferDone` notification for a scene without a pipeline.
    pub(crate) fn on_buffer_done(&self, bytes: u32) {
        match self.direction() {
            Direction::Capture => self.on_captured(bytes),
            Direction::Playback | Direction::Duplex => {
                {
                    let mut inner = self.lock();
                    let block_size = inner.region.as_ref().map_or(1, |r| r.block_size());
                    inner.counters.release(u64::from(bytes.div_ceil(block_size)));
                }
                self.emit(StreamEvent::BufferDone { bytes });
            }
        }
    }

    fn on_captured(&self, bytes: u32) {
        let produced = self.lock().record_capture(bytes);
        match produced {
            Some(blocks) => {
                tracing::trace!(session_id = %self.id(), bytes, blocks, "capture blocks filled");
                self.emit(StreamEvent::BufferDone { bytes });
            }
            None => {
                tracing::warn!(session_id = %self.id(), bytes, "capture notification overflows the ring, dropped");
            }
        }
    }

    fn ensure_direction(&self, direction: Direction, op: &'static str) -> Result<()> {
        if self.direction() == direction {
            return Ok(());
        }
        Err(ValidationError::UnsupportedByScene {
            scene: self.scene().as_str(),
            op,
        }
        .into())
    }
}

impl SessionInner {
    /// Account `bytes` captured by the DSP as one span per block slot,
    /// continuing from the next slot in ring order. Returns the number of
    /// blocks produced, or `None` when the ring has no room for them.
    fn record_capture(&mut self, bytes: u32) -> Option<u64> {
        let region = self.region.as_ref()?;
        let block_size = region.block_size();
        let count = u64::from(region.block_count());
        let blocks = u64::from(bytes.div_ceil(block_size));
        if blocks > count.saturating_sub(self.counters.outstanding()) {
            return None;
        }

        let mut slot = self.counters.produced() % count;
        let mut rest = bytes;
        while rest > 0 {
            let len = rest.min(block_size);
            let offset = u32::try_from(slot).unwrap_or(0).saturating_mul(block_size);
            self.captured.push_back(CaptureSpan { offset, len, read: 0 });
            rest -= len;
            slot = (slot + 1) % count;
        }
        self.counters.produce(blocks);
        self.readable = self.readable.saturating_add(u64::from(bytes));
        Some(blocks)
    }
}

impl AudioCore {
    /// Submit playback data. Returns the number of bytes accepted, which is
    /// always all of `data`.
    ///
    /// Bytes that do not fill a block stay buffered; the call fails without
    /// taking anything if the whole blocks would not fit in the ring.
    ///
    /// # Errors
    ///
    /// `NotAttached` before startup or after shutdown, `InsufficientSpace`
    /// when the ring is full, `UnsupportedByScene` on capture scenes, or a
    /// power error if the DSP cannot be powered on.
    pub fn write(&self, session: &Session, data: &[u8]) -> Result<usize> {
        let core = &self.inner;
        core.ensure_reachable()?;
        if !session.is_attached() {
            return Err(StreamError::NotAttached(session.id().raw()).into());
        }
        session.ensure_direction(Direction::Playback, "write")?;
        core.power
            .ensure_powered()
            .context(ErrorContext::new("write").with("session_id", session.id().to_string()))?;

        let (blocks, write_cursor, block_size) = {
            let mut guard = session.lock();
            let inner = &mut *guard;
            let Some(region) = inner.region.as_mut() else {
                return Err(StreamError::NotAttached(session.id().raw()).into());
            };
            let block_size = region.block_size() as usize;
            let free = u64::from(region.block_count()).saturating_sub(inner.counters.outstanding());
            let pending = inner.residue.len() + data.len();
            let full = pending / block_size;
            if u64::try_from(full).unwrap_or(u64::MAX) > free {
                return Err(StreamError::InsufficientSpace {
                    session: session.id().raw(),
                    free: u32::try_from(free).unwrap_or(u32::MAX),
                }
                .into());
            }

            let mut staged = std::mem::take(&mut inner.residue);
            staged.extend_from_slice(data);
            let mut blocks = Vec::with_capacity(full);
            let mut chunks = staged.chunks_exact(block_size);
            for chunk in chunks.by_ref() {
                blocks.push(region.commit_block(chunk));
            }
            inner.residue = chunks.remainder().to_vec();
            inner.counters.produce(u64::try_from(blocks.len()).unwrap_or(u64::MAX));
            inner.total_bytes = inner
                .total_bytes
                .saturating_add(u64::try_from(data.len()).unwrap_or(u64::MAX));
            (blocks, region.head().write_cursor, block_size)
        };

        if blocks.is_empty() {
            return Ok(data.len());
        }
        tracing::trace!(session_id = %session.id(), blocks = blocks.len(), write_cursor, "blocks committed");
        if session.has_pipeline() {
            session.with_pipeline(|pipeline| {
                for block in blocks {
                    pipeline.push(block);
                }
            });
        } else {
            let bytes = u32::try_from(blocks.len() * block_size).unwrap_or(u32::MAX);
            core.notify(session, Request::DataNotify { write_cursor, bytes })?;
        }
        Ok(data.len())
    }

    /// Copy captured bytes into `out`. Returns how many were copied; zero
    /// when nothing is readable yet.
    ///
    /// # Errors
    ///
    /// `NotAttached` before startup or after shutdown, `UnsupportedByScene`
    /// on playback scenes.
    pub fn read(&self, session: &Session, out: &mut [u8]) -> Result<usize> {
        let core = &self.inner;
        core.ensure_reachable()?;
        if !session.is_attached() {
            return Err(StreamError::NotAttached(session.id().raw()).into());
        }
        session.ensure_direction(Direction::Capture, "read")?;

        let (n, recycled, read_cursor) = {
            let mut guard = session.lock();
            let inner = &mut *guard;
            let Some(region) = inner.region.as_mut() else {
                return Err(StreamError::NotAttached(session.id().raw()).into());
            };
            let mut n = 0usize;
            let mut recycled = Vec::new();
            while n < out.len() {
                let Some(span) = inner.captured.front_mut() else {
                    break;
                };
                let take = (span.remaining() as usize).min(out.len() - n);
                let Some(dst) = out.get_mut(n..n + take) else {
                    break;
                };
                region.consume_at(span.offset.saturating_add(span.read), dst);
                span.read = span.read.saturating_add(u32::try_from(take).unwrap_or(u32::MAX));
                n += take;
                if span.remaining() > 0 {
                    continue;
                }
                // Fully read blocks go back to the DSP, short ones included.
                if let Some(done) = inner.captured.pop_front() {
                    region.release_slot(done.offset);
                    recycled.push(region.block_at(done.offset, region.block_size()));
                }
            }
            if n == 0 {
                return Ok(0);
            }
            inner.readable = inner.readable.saturating_sub(u64::try_from(n).unwrap_or(u64::MAX));
            inner.counters.release(u64::try_from(recycled.len()).unwrap_or(u64::MAX));
            (n, recycled, region.head().read_cursor)
        };

        if session.has_pipeline() {
            session.with_pipeline(|pipeline| {
                for block in recycled {
                    pipeline.push(block);
                }
            });
        } else {
            let bytes = u32::try_from(n).unwrap_or(u32::MAX);
            core.notify(
                session,
                Request::DataNotify {
                    write_cursor: read_cursor,
                    bytes,
                },
            )?;
        }
        Ok(n)
    }
}
