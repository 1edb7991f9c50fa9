//! Producer (playback) and consumer (capture) workers.
//!
//! Each worker is a named thread that waits on a wake channel for at most
//! one poll quantum, then does one round of work if the session's
//! work-enabled flag is set. Enabling, disabling, pushing a block or
//! shutting down pokes the channel so the worker reacts without waiting out
//! the quantum.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};

use crate::block::{BlockQueue, DataBlock};
use crate::error::{PipelineError, PipelineResult};
use crate::transport::BlockTransport;

/// Worker timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Longest a worker sleeps between rounds when nothing wakes it.
    pub poll_interval: Duration,
    /// Capture back-off after an overrun.
    pub overrun_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(1),
            overrun_backoff: Duration::from_millis(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineDirection {
    /// Queue to device
    Playback,
    /// Device to queue
    Capture,
}

impl PipelineDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineDirection::Playback => "playback",
            PipelineDirection::Capture => "capture",
        }
    }
}

/// Called with the byte count of every submitted or filled block.
pub type BlockCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Counter snapshot returned by [`Pipeline::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineStats {
    pub submitted: u64,
    pub filled: u64,
    pub discarded: u64,
    pub overruns: u64,
    pub transport_errors: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    filled: AtomicU64,
    discarded: AtomicU64,
    overruns: AtomicU64,
    transport_errors: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            filled: self.filled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
        }
    }
}

struct Worker {
    name: String,
    direction: PipelineDirection,
    queue: Arc<BlockQueue>,
    transport: Arc<dyn BlockTransport>,
    callback: BlockCallback,
    work_enabled: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
    wake_rx: Receiver<()>,
    config: PipelineConfig,
}

impl Worker {
    fn run(self) {
        tracing::debug!(worker = %self.name, "pipeline worker started");
        loop {
            match self.wake_rx.recv_timeout(self.config.poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            if self.shutdown.load(Ordering::Acquire) {
                break;
            }
            if !self.work_enabled.load(Ordering::Acquire) {
                continue;
            }
            match self.direction {
                PipelineDirection::Playback => self.produce(),
                PipelineDirection::Capture => self.consume(),
            }
        }
        tracing::debug!(worker = %self.name, "pipeline worker stopped");
    }

    fn produce(&self) {
        let mut room = self.transport.capacity();
        while room > 0 && self.work_enabled.load(Ordering::Acquire) {
            let Some(block) = self.queue.take() else {
                return;
            };
            if let Err(e) = self.transport.submit(&block) {
                self.counters.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = %self.name, error = %e, "block submission failed");
                return;
            }
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            if !block.is_marker() {
                (self.callback)(block.len);
            }
            room -= 1;
        }
    }

    fn consume(&self) {
        let mut ready = self.transport.capacity();
        while ready > 0 && self.work_enabled.load(Ordering::Acquire) {
            let Some(block) = self.queue.take() else {
                self.counters.overruns.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = %self.name, ready, "capture overrun, no free block");
                self.backoff();
                return;
            };
            let filled = self.transport.fill(&block);
            if filled <= 0 {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            } else {
                self.counters.filled.fetch_add(1, Ordering::Relaxed);
                (self.callback)(u32::try_from(filled).unwrap_or(u32::MAX));
            }
            ready -= 1;
        }
    }

    fn backoff(&self) {
        // A wake during back-off ends it early; shutdown is re-checked by run().
        if let Err(RecvTimeoutError::Disconnected) = self.wake_rx.recv_timeout(self.config.overrun_backoff) {
            tracing::trace!(worker = %self.name, "wake channel closed during back-off");
        }
    }
}

/// A running worker and the FIFO it serves.
pub struct Pipeline {
    name: String,
    direction: PipelineDirection,
    queue: Arc<BlockQueue>,
    work_enabled: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    counters: Arc<Counters>,
    wake_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Pipeline {
    /// Spawn the worker thread. It stays idle until `work_enabled` is set.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Spawn`] if the thread cannot be created.
    pub fn spawn(
        name: impl Into<String>,
        direction: PipelineDirection,
        transport: Arc<dyn BlockTransport>,
        callback: BlockCallback,
        work_enabled: Arc<AtomicBool>,
        config: PipelineConfig,
    ) -> PipelineResult<Self> {
        let name = name.into();
        let queue = Arc::new(BlockQueue::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());
        let (wake_tx, wake_rx) = channel::bounded(1);

        let worker = Worker {
            name: name.clone(),
            direction,
            queue: Arc::clone(&queue),
            transport,
            callback,
            work_enabled: Arc::clone(&work_enabled),
            shutdown: Arc::clone(&shutdown),
            counters: Arc::clone(&counters),
            wake_rx,
            config,
        };
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run())
            .map_err(|e| PipelineError::Spawn(e.to_string()))?;

        Ok(Self {
            name,
            direction,
            queue,
            work_enabled,
            shutdown,
            counters,
            wake_tx,
            handle: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn direction(&self) -> PipelineDirection {
        self.direction
    }

    pub fn queue(&self) -> &Arc<BlockQueue> {
        &self.queue
    }

    fn wake(&self) {
        // Full channel means a wake is already pending.
        if let Err(channel::TrySendError::Disconnected(())) = self.wake_tx.try_send(()) {
            tracing::trace!(worker = %self.name, "wake after worker exit");
        }
    }

    pub fn enable(&self) {
        self.work_enabled.store(true, Ordering::Release);
        self.wake();
    }

    pub fn disable(&self) {
        self.work_enabled.store(false, Ordering::Release);
        self.wake();
    }

    pub fn is_enabled(&self) -> bool {
        self.work_enabled.load(Ordering::Acquire)
    }

    /// Queue a block and wake the worker.
    pub fn push(&self, block: DataBlock) {
        self.queue.put(block);
        self.wake();
    }

    /// Drop queued blocks. Returns how many were dropped.
    pub fn flush(&self) -> usize {
        self.queue.clear()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Disable, stop and join the worker.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::WorkerPanicked`] if the worker panicked.
    pub fn stop(&mut self) -> PipelineResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.work_enabled.store(false, Ordering::Release);
        self.shutdown.store(true, Ordering::Release);
        self.wake();
        if handle.thread().id() == thread::current().id() {
            // Last owner dropped from inside the worker's own callback.
            tracing::debug!(worker = %self.name, "pipeline stopped from its own thread, detaching");
            return Ok(());
        }
        if handle.join().is_err() {
            tracing::error!(worker = %self.name, "pipeline worker panicked");
            return Err(PipelineError::WorkerPanicked(self.name.clone()));
        }
        let dropped = self.queue.clear();
        tracing::debug!(worker = %self.name, dropped, "pipeline joined");
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.handle.is_some() {
            tracing::warn!(worker = %self.name, "pipeline dropped while running - forcing stop");
            if let Err(e) = self.stop() {
                tracing::error!(worker = %self.name, error = %e, "forced stop failed");
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("direction", &self.direction)
            .field("enabled", &self.is_enabled())
            .field("queued", &self.queue.len())
            .finish()
    }
}
