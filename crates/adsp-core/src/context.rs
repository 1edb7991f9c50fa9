//! The [`AudioCore`] context object.
//!
//! One value owns the registry, the vote manager, the recovery orchestrator
//! and the channel to the DSP. It is constructed once and handed to every
//! caller; clones share the same state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use adsp_errors::{AdspError, Result, StreamError, ValidationError};
use adsp_pipeline::BlockTransport;
use adsp_power::{PowerController, PowerVoteManager};
use adsp_protocol::{
    Address, FrameSink, Function, Message, MessageChannel, Reply, ReplyBody, Request, SessionId,
};
use adsp_recovery::{DspReachability, RecoveryOrchestrator, RepairService};
use crossbeam::channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;

use crate::config::CoreConfig;
use crate::pending::{Completion, GLOBAL_SESSION, PendingSlot};
use crate::recovery::builtin_action;
use crate::registry::StreamRegistry;
use crate::session::Session;

/// Invoked when a request times out, before the error is returned.
pub trait DiagnosticHook: Send + Sync {
    /// `session` is `None` for global requests.
    fn on_timeout(&self, session: Option<SessionId>, function: Function);
}

/// Called once per fault with the reason code. Expected to start recovery
/// from its own context.
pub type FaultListener = Arc<dyn Fn(u32) + Send + Sync>;

/// Dispatch and request counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoreStats {
    pub requests_sent: u64,
    pub timeouts: u64,
    pub peer_failures: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub unmatched_replies: u64,
    pub faults: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) requests_sent: AtomicU64,
    pub(crate) timeouts: AtomicU64,
    pub(crate) peer_failures: AtomicU64,
    pub(crate) frames_received: AtomicU64,
    pub(crate) frames_dropped: AtomicU64,
    pub(crate) unmatched_replies: AtomicU64,
    pub(crate) faults: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CoreStats {
        CoreStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            peer_failures: self.peer_failures.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            unmatched_replies: self.unmatched_replies.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct CoreInner {
    pub(crate) config: CoreConfig,
    pub(crate) channel: Arc<dyn MessageChannel>,
    pub(crate) registry: StreamRegistry,
    pub(crate) power: PowerVoteManager,
    pub(crate) orchestrator: RecoveryOrchestrator,
    pub(crate) reachability: DspReachability,
    pub(crate) transport: Option<Arc<dyn BlockTransport>>,
    pub(crate) diagnostics: Option<Arc<dyn DiagnosticHook>>,
    /// Requests not tied to a session (RTC, ping).
    pub(crate) global_pending: Mutex<PendingSlot>,
    global_op: Mutex<()>,
    pub(crate) fault_listeners: Mutex<Vec<FaultListener>>,
    next_token: AtomicU64,
    pub(crate) counters: Counters,
}

/// Who a request is waiting on behalf of.
#[derive(Clone, Copy)]
enum Waiter<'a> {
    Session(&'a Session),
    Global,
}

impl Waiter<'_> {
    fn session_raw(self) -> u16 {
        match self {
            Waiter::Session(s) => s.id().raw(),
            Waiter::Global => GLOBAL_SESSION,
        }
    }

    fn session_id(self) -> Option<SessionId> {
        match self {
            Waiter::Session(s) => Some(s.id()),
            Waiter::Global => None,
        }
    }
}

impl CoreInner {
    pub(crate) fn ensure_reachable(&self) -> Result<()> {
        if self.reachability.is_reachable() {
            Ok(())
        } else {
            Err(AdspError::unavailable("DSP is unreachable until recovery completes"))
        }
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    /// Send `request` on behalf of `session` and wait for its reply.
    pub(crate) fn request(&self, session: &Session, request: Request) -> Result<ReplyBody> {
        self.request_within(session, request, self.config.op_timeout)
    }

    pub(crate) fn request_within(
        &self,
        session: &Session,
        request: Request,
        timeout: Duration,
    ) -> Result<ReplyBody> {
        let function = request.function();
        let frame = Message::Request(request).encode(session.address())?;
        let token = self.next_token();
        let rx = session
            .lock()
            .pending
            .arm(token, function)
            .map_err(|pending| StreamError::Busy {
                session: session.id().raw(),
                pending,
            })?;

        let disarm = || {
            session.lock().pending.disarm(token);
        };
        if let Err(e) = self.ensure_reachable() {
            disarm();
            return Err(e);
        }
        tracing::debug!(session_id = %session.id(), op = function.as_str(), "request sent");
        if let Err(e) = self.channel.send(&frame) {
            disarm();
            tracing::warn!(session_id = %session.id(), op = function.as_str(), error = %e, "send failed");
            return Err(e.into());
        }
        Counters::bump(&self.counters.requests_sent);
        self.await_reply(Waiter::Session(session), function, rx, timeout, disarm)
    }

    /// Send a request not tied to a session. Global requests are serialized.
    pub(crate) fn request_global(&self, request: Request) -> Result<ReplyBody> {
        self.ensure_reachable()?;
        let _serial = self.global_op.lock();
        let function = request.function();
        let frame = Message::Request(request).encode(Address::GLOBAL)?;
        let token = self.next_token();
        let rx = self
            .global_pending
            .lock()
            .arm(token, function)
            .map_err(|pending| StreamError::Busy {
                session: GLOBAL_SESSION,
                pending,
            })?;

        let disarm = || {
            self.global_pending.lock().disarm(token);
        };
        if let Err(e) = self.ensure_reachable() {
            disarm();
            return Err(e);
        }
        tracing::debug!(op = function.as_str(), "global request sent");
        if let Err(e) = self.channel.send(&frame) {
            disarm();
            return Err(e.into());
        }
        Counters::bump(&self.counters.requests_sent);
        self.await_reply(Waiter::Global, function, rx, self.config.op_timeout, disarm)
    }

    /// Send a frame that expects no reply.
    pub(crate) fn notify(&self, session: &Session, request: Request) -> Result<()> {
        let frame = Message::Request(request).encode(session.address())?;
        self.channel.send(&frame)?;
        Ok(())
    }

    fn await_reply(
        &self,
        waiter: Waiter<'_>,
        function: Function,
        rx: Receiver<Completion>,
        timeout: Duration,
        disarm: impl FnOnce(),
    ) -> Result<ReplyBody> {
        let op = function.as_str();
        match rx.recv_timeout(timeout) {
            Ok(Completion::Replied(Reply {
                result_code: 0,
                body,
                ..
            })) => Ok(body),
            Ok(Completion::Replied(reply)) => {
                Counters::bump(&self.counters.peer_failures);
                tracing::error!(
                    session_id = waiter.session_raw(),
                    op,
                    result_code = reply.result_code,
                    "DSP rejected request"
                );
                Err(StreamError::peer_failure(waiter.session_raw(), op, reply.result_code).into())
            }
            Ok(Completion::Aborted) | Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!(session_id = waiter.session_raw(), op, "request aborted by fault");
                Err(StreamError::aborted(waiter.session_raw(), op).into())
            }
            Err(RecvTimeoutError::Timeout) => {
                disarm();
                Counters::bump(&self.counters.timeouts);
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(session_id = waiter.session_raw(), op, timeout_ms, "request timed out");
                if let Some(hook) = &self.diagnostics {
                    hook.on_timeout(waiter.session_id(), function);
                }
                Err(StreamError::timeout(waiter.session_raw(), op, timeout_ms).into())
            }
        }
    }
}

/// The audio DSP control plane.
#[derive(Clone)]
pub struct AudioCore {
    pub(crate) inner: Arc<CoreInner>,
}

/// Builder for [`AudioCore`].
#[derive(Default)]
pub struct AudioCoreBuilder {
    config: CoreConfig,
    channel: Option<Arc<dyn MessageChannel>>,
    power: Option<Arc<dyn PowerController>>,
    repair: Option<Arc<dyn RepairService>>,
    transport: Option<Arc<dyn BlockTransport>>,
    diagnostics: Option<Arc<dyn DiagnosticHook>>,
}

impl AudioCoreBuilder {
    #[must_use]
    pub fn config(mut self, config: CoreConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn channel(mut self, channel: Arc<dyn MessageChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    #[must_use]
    pub fn power(mut self, power: Arc<dyn PowerController>) -> Self {
        self.power = Some(power);
        self
    }

    #[must_use]
    pub fn repair(mut self, repair: Arc<dyn RepairService>) -> Self {
        self.repair = Some(repair);
        self
    }

    /// Transfer hardware for ultra-fast scenes. Startup of such a scene
    /// fails without one.
    #[must_use]
    pub fn block_transport(mut self, transport: Arc<dyn BlockTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn diagnostics(mut self, hook: Arc<dyn DiagnosticHook>) -> Self {
        self.diagnostics = Some(hook);
        self
    }

    /// # Errors
    ///
    /// Returns a configuration error if the config is invalid, or a
    /// validation error naming the first missing collaborator.
    pub fn build(self) -> Result<AudioCore> {
        self.config.validate()?;
        let channel = self.channel.ok_or_else(|| ValidationError::required("channel"))?;
        let power = self.power.ok_or_else(|| ValidationError::required("power"))?;
        let repair = self.repair.ok_or_else(|| ValidationError::required("repair"))?;
        let config = self.config;
        let transport = self.transport;
        let diagnostics = self.diagnostics;

        let reachability = DspReachability::new();
        let inner = Arc::new_cyclic(|weak: &Weak<CoreInner>| {
            let orchestrator = RecoveryOrchestrator::new(
                config.recovery_config(),
                reachability.clone(),
                repair,
            );
            // Runs before any action registered by the owner.
            orchestrator.register(builtin_action(weak.clone()));
            CoreInner {
                registry: StreamRegistry::new(config.max_sessions, reachability.clone()),
                power: PowerVoteManager::new(power, reachability.clone(), config.auto_power_off),
                orchestrator,
                reachability,
                channel,
                transport,
                diagnostics,
                global_pending: Mutex::new(PendingSlot::default()),
                global_op: Mutex::new(()),
                fault_listeners: Mutex::new(Vec::new()),
                next_token: AtomicU64::new(1),
                counters: Counters::default(),
                config,
            }
        });
        tracing::info!(max_sessions = inner.config.max_sessions, "audio core ready");
        Ok(AudioCore { inner })
    }
}

impl AudioCore {
    pub fn builder() -> AudioCoreBuilder {
        AudioCoreBuilder::default()
    }

    pub fn config(&self) -> &CoreConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    /// Vote manager, for reserved non-stream voters.
    pub fn power(&self) -> &PowerVoteManager {
        &self.inner.power
    }

    /// Orchestrator, for registering further recovery actions.
    pub fn orchestrator(&self) -> &RecoveryOrchestrator {
        &self.inner.orchestrator
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachability.is_reachable()
    }

    pub fn stats(&self) -> CoreStats {
        self.inner.counters.snapshot()
    }

    /// Receive half for the transport: feed every inbound frame here.
    pub fn frame_sink(&self) -> FrameSink {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move |bytes: &[u8]| {
            if let Some(inner) = weak.upgrade() {
                inner.on_frame(bytes);
            }
        })
    }

    pub fn on_frame(&self, bytes: &[u8]) {
        self.inner.on_frame(bytes);
    }

    /// DSP real-time clock in microseconds.
    ///
    /// # Errors
    ///
    /// Fails like any other request: unavailable, timeout, peer failure.
    pub fn get_rtc(&self) -> Result<u64> {
        match self.inner.request_global(Request::GetRtc)? {
            ReplyBody::Rtc { rtc_us } => Ok(rtc_us),
            other => Err(AdspError::Protocol(format!("unexpected get_rtc reply body {other:?}"))),
        }
    }

    /// Round-trip a ping and return the elapsed time.
    ///
    /// # Errors
    ///
    /// Fails like any other request.
    pub fn ping(&self) -> Result<Duration> {
        let started = std::time::Instant::now();
        self.inner.request_global(Request::Ping)?;
        Ok(started.elapsed())
    }
}

impl std::fmt::Debug for AudioCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCore")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("reachable", &self.is_reachable())
            .finish_non_exhaustive()
    }
}
