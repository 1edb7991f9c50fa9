//! Stream sessions.
//!
//! A [`Session`] is a cheap handle onto shared session state. The flags a
//! data-submission call checks without taking the lock (active, front-end
//! attached, work enabled) are atomics; everything else sits behind one
//! session mutex, which is never held while sending a frame, invoking the
//! owner's callback or joining a pipeline worker.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use adsp_errors::StreamError;
use adsp_pipeline::{BlockCounters, Pipeline};
use adsp_protocol::{
    Address, ChannelMap, Direction, Reply, RouteId, SampleFormat, SceneInfo, SceneType, SessionId,
};
use crossbeam::channel::Sender;
use parking_lot::{Mutex, MutexGuard};

use crate::pending::PendingSlot;
use crate::region::{RegionHead, SharedRegion};
use crate::state::{StreamOp, StreamState};

/// Owner notification sink. Never invoked with a session lock held.
pub type StreamCallback = Arc<dyn Fn(SessionId, &StreamEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// `bytes` were consumed (playback) or captured
    BufferDone { bytes: u32 },
    /// A lifecycle operation completed and was committed
    TransitionAck { op: StreamOp },
    /// The block marked final by a drain was consumed
    DrainComplete,
    KeywordDetected { keyword: u32 },
    /// Opaque firmware event
    DspEvent { code: u32 },
}

/// Front-end descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrontEnd {
    pub format: Option<SampleFormat>,
    pub attached: bool,
}

/// One physical route feeding or fed by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackEnd {
    pub route: RouteId,
    pub direction: Direction,
    pub format: SampleFormat,
    pub channel_map: ChannelMap,
    /// Clear when route configuration failed.
    pub enabled: bool,
}

#[derive(Debug, Default)]
pub(crate) struct DrainState {
    pub(crate) requested: bool,
    pub(crate) consumed: bool,
    pub(crate) waiter: Option<Sender<()>>,
}

/// One captured block reported by the DSP and not yet fully read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CaptureSpan {
    /// Ring offset of the block slot.
    pub(crate) offset: u32,
    pub(crate) len: u32,
    pub(crate) read: u32,
}

impl CaptureSpan {
    pub(crate) fn remaining(&self) -> u32 {
        self.len.saturating_sub(self.read)
    }
}

#[derive(Default)]
pub(crate) struct SessionInner {
    pub(crate) state: StreamState,
    pub(crate) frontend: FrontEnd,
    pub(crate) backends: Vec<BackEnd>,
    pub(crate) counters: BlockCounters,
    /// Bytes written that do not fill a block yet.
    pub(crate) residue: Vec<u8>,
    pub(crate) total_bytes: u64,
    /// Captured bytes not yet read by the owner.
    pub(crate) readable: u64,
    /// Captured blocks in ring order, one per produced block.
    pub(crate) captured: VecDeque<CaptureSpan>,
    pub(crate) region: Option<SharedRegion>,
    pub(crate) pending: PendingSlot,
    /// Lifecycle or control operation currently running.
    pub(crate) busy_with: Option<&'static str>,
    pub(crate) drain: DrainState,
    pub(crate) voted: bool,
    pub(crate) callback: Option<StreamCallback>,
}

impl SessionInner {
    /// Zero the data accounting and the cursors, keeping the region.
    pub(crate) fn reset_data(&mut self) {
        self.counters.reset();
        self.residue.clear();
        self.readable = 0;
        self.captured.clear();
        if let Some(region) = self.region.as_mut() {
            region.reset_cursors();
        }
    }

    /// Return to Idle. Returns whether a power vote was held.
    fn clear_stream(&mut self) -> bool {
        self.reset_data();
        self.state = StreamState::Idle;
        self.frontend = FrontEnd::default();
        self.backends.clear();
        self.region = None;
        self.drain = DrainState::default();
        std::mem::take(&mut self.voted)
    }
}

pub(crate) struct SessionShared {
    id: SessionId,
    info: SceneInfo,
    active: AtomicBool,
    fe_attached: AtomicBool,
    in_use: AtomicBool,
    freed: AtomicBool,
    work_enabled: Arc<AtomicBool>,
    inner: Mutex<SessionInner>,
    pipeline: Mutex<Option<Pipeline>>,
}

/// Handle onto one stream session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<SessionShared>,
}

/// Point-in-time view of a session, for inspection and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: StreamState,
    pub active: bool,
    pub attached: bool,
    pub in_use: bool,
    pub produced: u64,
    pub released: u64,
    pub residue_len: usize,
    pub total_bytes: u64,
    pub head: Option<RegionHead>,
    pub pending: Option<&'static str>,
    pub routes: usize,
}

impl Session {
    pub(crate) fn new(id: SessionId, info: SceneInfo) -> Self {
        Self {
            shared: Arc::new(SessionShared {
                id,
                info,
                active: AtomicBool::new(false),
                fe_attached: AtomicBool::new(false),
                in_use: AtomicBool::new(true),
                freed: AtomicBool::new(false),
                work_enabled: Arc::new(AtomicBool::new(false)),
                inner: Mutex::new(SessionInner::default()),
                pipeline: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(weak: &Weak<SessionShared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub(crate) fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn id(&self) -> SessionId {
        self.shared.id
    }

    pub fn info(&self) -> SceneInfo {
        self.shared.info
    }

    pub fn scene(&self) -> SceneType {
        self.shared.info.scene
    }

    pub fn instance(&self) -> u8 {
        self.shared.info.instance
    }

    pub fn direction(&self) -> Direction {
        self.shared.info.direction
    }

    /// Wire address of frames for this session.
    pub fn address(&self) -> Address {
        Address::new(self.scene().category(), self.instance())
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    /// Set between startup and shutdown; dispatch only routes frames to
    /// active sessions.
    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    pub fn is_attached(&self) -> bool {
        self.shared.fe_attached.load(Ordering::Acquire)
    }

    /// Cleared by `idle`, set again by `prepare` or a re-`alloc`.
    pub fn is_in_use(&self) -> bool {
        self.shared.in_use.load(Ordering::Acquire)
    }

    pub fn is_freed(&self) -> bool {
        self.shared.freed.load(Ordering::Acquire)
    }

    pub fn counters(&self) -> BlockCounters {
        self.lock().counters
    }

    pub fn residue_len(&self) -> usize {
        self.lock().residue.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    pub fn readable_bytes(&self) -> u64 {
        self.lock().readable
    }

    pub fn region_head(&self) -> Option<RegionHead> {
        self.lock().region.as_ref().map(SharedRegion::head)
    }

    pub fn front_end(&self) -> FrontEnd {
        self.lock().frontend
    }

    pub fn back_ends(&self) -> Vec<BackEnd> {
        self.lock().backends.clone()
    }

    /// Name of the request currently awaiting a reply.
    pub fn in_flight(&self) -> Option<&'static str> {
        self.lock().pending.in_flight()
    }

    pub fn has_pipeline(&self) -> bool {
        self.shared.pipeline.lock().is_some()
    }

    pub fn set_callback(&self, callback: impl Fn(SessionId, &StreamEvent) + Send + Sync + 'static) {
        self.lock().callback = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        self.lock().callback = None;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.lock();
        SessionSnapshot {
            id: self.id(),
            state: inner.state,
            active: self.is_active(),
            attached: self.is_attached(),
            in_use: self.is_in_use(),
            produced: inner.counters.produced(),
            released: inner.counters.released(),
            residue_len: inner.residue.len(),
            total_bytes: inner.total_bytes,
            head: inner.region.as_ref().map(SharedRegion::head),
            pending: inner.pending.in_flight(),
            routes: inner.backends.len(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.shared.inner.lock()
    }

    /// Claim the session for one operation.
    pub(crate) fn begin_op(&self, op: &'static str) -> Result<OpGuard<'_>, StreamError> {
        let mut inner = self.lock();
        if let Some(pending) = inner.busy_with.or(inner.pending.in_flight()) {
            return Err(StreamError::Busy {
                session: self.id().raw(),
                pending,
            });
        }
        inner.busy_with = Some(op);
        Ok(OpGuard { session: self })
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.shared.active.store(active, Ordering::Release);
    }

    pub(crate) fn set_attached(&self, attached: bool) {
        self.shared.fe_attached.store(attached, Ordering::Release);
        self.lock().frontend.attached = attached;
    }

    pub(crate) fn rearm(&self) -> bool {
        !self.shared.in_use.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn mark_freed(&self) {
        self.shared.freed.store(true, Ordering::Release);
    }

    pub(crate) fn work_enabled(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.work_enabled)
    }

    /// Invoke the owner's callback outside the session lock.
    pub(crate) fn emit(&self, event: StreamEvent) {
        let callback = self.lock().callback.clone();
        if let Some(callback) = callback {
            callback(self.id(), &event);
        }
    }

    /// Hand `reply` to the request waiting for it. Returns false if nothing
    /// was waiting for this function.
    pub(crate) fn complete(&self, reply: Reply) -> bool {
        let op = self.lock().pending.take_matching(&reply);
        match op {
            Some(op) => {
                op.complete(reply);
                true
            }
            None => false,
        }
    }

    /// Fail the in-flight request and any drain wait immediately.
    pub(crate) fn abort_pending(&self) -> bool {
        let (op, waiter) = {
            let mut inner = self.lock();
            (inner.pending.take(), inner.drain.waiter.take())
        };
        let aborted = op.is_some() || waiter.is_some();
        if let Some(op) = op {
            tracing::debug!(session_id = %self.id(), op = op.op(), "aborting in-flight request");
            op.abort();
        }
        drop(waiter);
        aborted
    }

    pub(crate) fn install_pipeline(&self, pipeline: Pipeline) -> Option<Pipeline> {
        self.shared.pipeline.lock().replace(pipeline)
    }

    pub(crate) fn with_pipeline<R>(&self, f: impl FnOnce(&Pipeline) -> R) -> Option<R> {
        self.shared.pipeline.lock().as_ref().map(f)
    }

    pub(crate) fn enable_work(&self) {
        if self.with_pipeline(Pipeline::enable).is_none() {
            self.shared.work_enabled.store(true, Ordering::Release);
        }
    }

    pub(crate) fn disable_work(&self) {
        if self.with_pipeline(Pipeline::disable).is_none() {
            self.shared.work_enabled.store(false, Ordering::Release);
        }
    }

    fn stop_pipeline(&self) {
        let pipeline = self.shared.pipeline.lock().take();
        if let Some(mut pipeline) = pipeline {
            if let Err(e) = pipeline.stop() {
                tracing::error!(session_id = %self.id(), error = %e, "pipeline worker failed");
            }
        }
    }

    /// Enter Idle: cursors and accounting reset, pipeline joined, flags
    /// cleared. Returns whether the session held a power vote.
    pub(crate) fn enter_idle(&self) -> bool {
        self.shared.fe_attached.store(false, Ordering::Release);
        self.shared.active.store(false, Ordering::Release);
        self.shared.work_enabled.store(false, Ordering::Release);
        let voted = self.lock().clear_stream();
        self.stop_pipeline();
        voted
    }

    /// Full reset used by `idle`. Returns `None` if the session was already
    /// idled, otherwise whether it held a power vote.
    pub(crate) fn reset_for_idle(&self) -> Option<bool> {
        if !self.shared.in_use.swap(false, Ordering::AcqRel) {
            return None;
        }
        self.abort_pending();
        let voted = self.enter_idle();
        let mut inner = self.lock();
        inner.total_bytes = 0;
        inner.callback = None;
        Some(voted)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id())
            .field("scene", &self.scene())
            .field("instance", &self.instance())
            .field("state", &self.state())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Clears the session's busy marker when the operation ends.
pub(crate) struct OpGuard<'a> {
    session: &'a Session,
}

impl Drop for OpGuard<'_> {
    fn drop(&mut self) {
        self.session.lock().busy_with = None;
    }
}
