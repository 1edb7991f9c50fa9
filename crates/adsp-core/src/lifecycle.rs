//! Lifecycle operations.
//!
//! Every operation follows one pattern: claim the session, check the
//! transition table, send one request per step and wait for its reply,
//! then commit the new state. Nothing is committed for a step that failed;
//! steps already acknowledged by the DSP stay committed.

use std::sync::Arc;

use adsp_errors::{AdspError, ErrorContext, Result, ResultExt, StreamError, ValidationError};
use adsp_pipeline::{BlockCallback, Pipeline, PipelineDirection};
use adsp_protocol::{
    ChannelMap, Direction, PathConfig, Request, RouteId, SampleFormat, SceneInfo, StartupParams,
    VoterId,
};
use crossbeam::channel::{self, RecvTimeoutError};

use crate::context::{AudioCore, CoreInner};
use crate::region::{RegionMemory, SharedRegion};
use crate::session::{BackEnd, FrontEnd, Session, StreamEvent};
use crate::state::{StreamOp, StreamState};

/// Everything `startup` needs to bring a session to Prepared.
#[derive(Clone)]
pub struct StreamConfig {
    pub format: SampleFormat,
    /// Primary route (input route of a duplex scene)
    pub route: RouteId,
    /// Output route, duplex scenes only
    pub route_out: Option<RouteId>,
    /// Routes configured with `AddPath` after the startup ack
    pub extra_routes: Vec<RouteId>,
    pub channel_map: ChannelMap,
    pub region: adsp_protocol::RegionDescriptor,
    pub memory: Arc<dyn RegionMemory>,
}

impl StreamConfig {
    pub fn new(
        format: SampleFormat,
        route: RouteId,
        region: adsp_protocol::RegionDescriptor,
        memory: Arc<dyn RegionMemory>,
    ) -> Self {
        Self {
            format,
            route,
            route_out: None,
            extra_routes: Vec::new(),
            channel_map: ChannelMap::first(format.channels),
            region,
            memory,
        }
    }

    #[must_use]
    pub fn with_output_route(mut self, route: RouteId) -> Self {
        self.route_out = Some(route);
        self
    }

    #[must_use]
    pub fn with_extra_route(mut self, route: RouteId) -> Self {
        self.extra_routes.push(route);
        self
    }

    #[must_use]
    pub fn with_channel_map(mut self, map: ChannelMap) -> Self {
        self.channel_map = map;
        self
    }

    /// Check the configuration against the scene. Nothing is sent on
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the first rejected field.
    pub fn validate(&self, info: SceneInfo) -> std::result::Result<(), ValidationError> {
        self.format
            .check(info.scene)
            .map_err(|(field, reason)| ValidationError::unsupported_format(field, reason))?;
        match (info.direction, self.route_out) {
            (Direction::Duplex, None) => return Err(ValidationError::required("route_out")),
            (Direction::Playback | Direction::Capture, Some(_)) => {
                return Err(ValidationError::unsupported_format(
                    "route_out",
                    format!("{} has a single route", info.scene),
                ));
            }
            _ => {}
        }
        if self.route.0 == RouteId::NONE {
            return Err(ValidationError::required("route"));
        }
        if self.channel_map.count() != u32::from(self.format.channels) {
            return Err(ValidationError::unsupported_format(
                "channel_map",
                format!(
                    "{} channels mapped for a {}-channel format",
                    self.channel_map.count(),
                    self.format.channels
                ),
            ));
        }
        Ok(())
    }

    fn back_ends(&self, info: SceneInfo) -> Vec<BackEnd> {
        let back_end = |route, direction| BackEnd {
            route,
            direction,
            format: self.format,
            channel_map: self.channel_map,
            enabled: true,
        };
        let mut backends = Vec::with_capacity(2 + self.extra_routes.len());
        match (info.direction, self.route_out) {
            (Direction::Duplex, Some(out)) => {
                backends.push(back_end(self.route, Direction::Capture));
                backends.push(back_end(out, Direction::Playback));
            }
            (direction, _) => backends.push(back_end(self.route, direction)),
        }
        backends
    }
}

impl std::fmt::Debug for StreamConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamConfig")
            .field("format", &self.format)
            .field("route", &self.route)
            .field("route_out", &self.route_out)
            .field("extra_routes", &self.extra_routes)
            .field("channel_map", &self.channel_map)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl CoreInner {
    /// Session must be registered and not idled.
    fn ensure_live(&self, session: &Session) -> Result<()> {
        if session.is_freed() || !session.is_in_use() {
            return Err(StreamError::NotFound(session.id().raw()).into());
        }
        self.ensure_reachable()
    }

    fn commit(&self, session: &Session, op: StreamOp, next: StreamState) {
        let previous = std::mem::replace(&mut session.lock().state, next);
        tracing::info!(session_id = %session.id(), op = %op, from = %previous, to = %next, "transition committed");
    }

    fn release_vote(&self, session: &Session) {
        if let Err(e) = self.power.unregister(VoterId::from(session.id())) {
            tracing::warn!(session_id = %session.id(), error = %e, "power vote release failed");
        }
    }

    fn spawn_pipeline(&self, session: &Session) -> Result<()> {
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| ValidationError::required("block_transport"))?;
        let direction = match session.direction() {
            Direction::Capture => PipelineDirection::Capture,
            Direction::Playback | Direction::Duplex => PipelineDirection::Playback,
        };
        let weak = session.downgrade();
        let callback: BlockCallback = Arc::new(move |bytes: u32| {
            if let Some(session) = Session::upgrade(&weak) {
                session.on_pipeline_block(bytes);
            }
        });
        let pipeline = Pipeline::spawn(
            format!("adsp-{:04x}", session.id().raw()),
            direction,
            transport,
            callback,
            session.work_enabled(),
            self.config.pipeline_config(),
        )?;
        if let Some(mut stale) = session.install_pipeline(pipeline) {
            if let Err(e) = stale.stop() {
                tracing::warn!(session_id = %session.id(), error = %e, "stale pipeline worker failed");
            }
        }
        session.prime_pipeline();
        Ok(())
    }

    /// Undo a startup that never reached Prepared.
    fn abandon_startup(&self, session: &Session) {
        let voted = session.enter_idle();
        if voted {
            self.release_vote(session);
        }
    }
}

impl AudioCore {
    /// Allocate (or re-arm) the session for `id`.
    ///
    /// # Errors
    ///
    /// See [`StreamRegistry::alloc`](crate::StreamRegistry::alloc).
    pub fn alloc(&self, id: adsp_protocol::SessionId) -> Result<Session> {
        self.inner.registry.alloc(id)
    }

    pub fn get(&self, id: adsp_protocol::SessionId) -> Option<Session> {
        self.inner.registry.get(id)
    }

    pub fn get_by_scene(&self, scene: adsp_protocol::SceneType, instance: u8) -> Option<Session> {
        self.inner.registry.get_by_scene(scene, instance)
    }

    /// Reset the session without freeing it, releasing any vote it held.
    pub fn idle(&self, session: &Session) {
        let report = self.inner.registry.idle(session);
        if report.held_vote {
            self.inner.release_vote(session);
        }
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the session was freed.
    pub fn prepare(&self, session: &Session) -> Result<()> {
        self.inner.registry.prepare(session)
    }

    /// # Errors
    ///
    /// Returns `NotIdle` unless the session is Idle.
    pub fn free(&self, session: &Session) -> Result<()> {
        let report = self.inner.registry.free(session)?;
        if report.held_vote {
            self.inner.release_vote(session);
        }
        Ok(())
    }

    pub fn live_count(&self) -> usize {
        self.inner.registry.live_count()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.inner.registry.sessions()
    }

    /// Idle to Prepared.
    ///
    /// Unsupported formats are rejected before anything is sent. Routes
    /// beyond the first that fail `AddPath` are left disabled with a
    /// warning; that is not a failure.
    ///
    /// # Errors
    ///
    /// Validation, illegal transition, busy, power, timeout, peer failure
    /// or abort. The session is left Idle with no vote held.
    pub fn startup(&self, session: &Session, config: StreamConfig) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        let _op = session.begin_op(StreamOp::Startup.as_str())?;
        let next = session.state().transition(StreamOp::Startup)?;
        let info = session.info();
        config.validate(info)?;
        if info.scene.is_ultra_fast() && core.transport.is_none() {
            return Err(ValidationError::required("block_transport").into());
        }
        let region = SharedRegion::new(config.region, Arc::clone(&config.memory))?;

        {
            let mut inner = session.lock();
            inner.reset_data();
            inner.region = Some(region);
            inner.frontend = FrontEnd {
                format: Some(config.format),
                attached: false,
            };
            inner.backends = config.back_ends(info);
            inner.total_bytes = 0;
        }

        let voter = VoterId::from(session.id());
        if let Err(e) = core
            .power
            .register(voter)
            .context(ErrorContext::new("power vote").with("voter", voter.to_string()))
        {
            session.enter_idle();
            return Err(e);
        }
        session.lock().voted = true;
        session.set_active(true);

        let params = StartupParams {
            format: config.format,
            direction: info.direction,
            route: config.route,
            route_out: config.route_out,
            channel_map: config.channel_map,
            region: config.region,
        };
        if let Err(e) = core.request(session, Request::Startup(params)) {
            core.abandon_startup(session);
            return Err(e);
        }

        if info.scene.is_ultra_fast() {
            if let Err(e) = core.spawn_pipeline(session) {
                tracing::error!(session_id = %session.id(), error = %e, "pipeline start failed, shutting stream down");
                if let Err(e) = core.request(session, Request::Shutdown) {
                    tracing::warn!(session_id = %session.id(), error = %e, "shutdown after pipeline failure not acknowledged");
                }
                core.abandon_startup(session);
                return Err(e);
            }
        }

        core.commit(session, StreamOp::Startup, next);
        session.set_attached(true);

        for route in &config.extra_routes {
            let path = PathConfig {
                route: *route,
                direction: info.direction,
                format: config.format,
                channel_map: config.channel_map,
            };
            let enabled = match core.request(session, Request::AddPath(path)) {
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!(session_id = %session.id(), route = route.0, error = %e, "route configuration failed, route left disabled");
                    false
                }
            };
            session.lock().backends.push(BackEnd {
                route: *route,
                direction: info.direction,
                format: config.format,
                channel_map: config.channel_map,
                enabled,
            });
        }

        session.emit(StreamEvent::TransitionAck {
            op: StreamOp::Startup,
        });
        Ok(())
    }

    /// Any active state to Idle.
    ///
    /// The front-end is detached before the request goes out, so concurrent
    /// writes fail locally instead of racing the round trip.
    ///
    /// # Errors
    ///
    /// Illegal transition, busy, timeout, peer failure or abort. The
    /// session keeps its state and is re-attached.
    pub fn shutdown(&self, session: &Session) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        let _op = session.begin_op(StreamOp::Shutdown.as_str())?;
        let current = session.state();
        current.transition(StreamOp::Shutdown)?;

        session.set_attached(false);
        session.disable_work();
        if let Err(e) = core.request(session, Request::Shutdown) {
            session.set_attached(true);
            if current == StreamState::Running {
                session.enable_work();
            }
            return Err(e);
        }

        if session.enter_idle() {
            core.release_vote(session);
        }
        tracing::info!(session_id = %session.id(), from = %current, "session shut down");
        session.emit(StreamEvent::TransitionAck {
            op: StreamOp::Shutdown,
        });
        Ok(())
    }

    /// Prepared or Paused to Running.
    ///
    /// # Errors
    ///
    /// Illegal transition, busy, timeout, peer failure or abort; the state
    /// is unchanged.
    pub fn start(&self, session: &Session) -> Result<()> {
        self.simple_transition(session, StreamOp::Start, Request::Start)
    }

    /// Prepared or Running to Paused.
    ///
    /// # Errors
    ///
    /// As [`Self::start`].
    pub fn pause(&self, session: &Session) -> Result<()> {
        self.simple_transition(session, StreamOp::Pause, Request::Pause)
    }

    /// Paused to Running.
    ///
    /// # Errors
    ///
    /// As [`Self::start`].
    pub fn resume(&self, session: &Session) -> Result<()> {
        self.simple_transition(session, StreamOp::Resume, Request::Resume)
    }

    fn simple_transition(&self, session: &Session, op: StreamOp, request: Request) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        let _op = session.begin_op(op.as_str())?;
        let next = session.state().transition(op)?;
        core.request(session, request)?;
        core.commit(session, op, next);
        match next {
            StreamState::Running => session.enable_work(),
            _ => session.disable_work(),
        }
        session.emit(StreamEvent::TransitionAck { op });
        Ok(())
    }

    /// Discard queued data. A running stream is paused around the flush
    /// and resumed afterwards.
    ///
    /// # Errors
    ///
    /// Any step's failure. A pause already acknowledged stays committed.
    pub fn flush(&self, session: &Session) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        let _op = session.begin_op(StreamOp::Flush.as_str())?;
        let current = session.state();
        current.transition(StreamOp::Flush)?;

        let was_running = current == StreamState::Running;
        if was_running {
            core.request(session, Request::Pause)?;
            core.commit(session, StreamOp::Pause, StreamState::Paused);
            session.disable_work();
        }
        core.request(session, Request::Flush)?;
        session.lock().reset_data();
        session.with_pipeline(|p| p.flush());
        session.prime_pipeline();

        if was_running {
            core.request(session, Request::Resume)?;
            core.commit(session, StreamOp::Resume, StreamState::Running);
            session.enable_work();
        }
        session.emit(StreamEvent::TransitionAck { op: StreamOp::Flush });
        Ok(())
    }

    /// Back to Prepared with queued data dropped and counters reset.
    ///
    /// Real-time voice scenes get a single stop; every other scene is
    /// paused (if running), flushed and then stopped.
    ///
    /// # Errors
    ///
    /// Any step's failure. Steps already acknowledged stay committed.
    pub fn stop(&self, session: &Session) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        let _op = session.begin_op(StreamOp::Stop.as_str())?;
        let current = session.state();
        let next = current.transition(StreamOp::Stop)?;

        if !session.scene().is_realtime_voice() {
            if current == StreamState::Running {
                core.request(session, Request::Pause)?;
                core.commit(session, StreamOp::Pause, StreamState::Paused);
                session.disable_work();
            }
            core.request(session, Request::Flush)?;
        }
        core.request(session, Request::Stop)?;

        core.commit(session, StreamOp::Stop, next);
        session.disable_work();
        session.with_pipeline(|p| p.flush());
        {
            let mut inner = session.lock();
            inner.reset_data();
            inner.drain = Default::default();
            if let Some(region) = inner.region.as_mut() {
                region.clear_final();
            }
        }
        session.prime_pipeline();
        session.emit(StreamEvent::TransitionAck { op: StreamOp::Stop });
        Ok(())
    }

    /// Mark the end of the stream. Residual bytes are committed as a short
    /// final block first. Offload playback only.
    ///
    /// # Errors
    ///
    /// `UnsupportedByScene`, illegal transition, busy, timeout, peer
    /// failure or abort. `InsufficientSpace` when residue is buffered but
    /// every ring block is still owned by the DSP; nothing is sent and the
    /// caller retries after the next `BufferDone`.
    pub fn drain(&self, session: &Session) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        require_drain(session, StreamOp::Drain)?;
        let _op = session.begin_op(StreamOp::Drain.as_str())?;
        session.state().transition(StreamOp::Drain)?;

        let final_len = {
            let mut guard = session.lock();
            let inner = &mut *guard;
            let Some(region) = inner.region.as_mut() else {
                return Err(StreamError::NotAttached(session.id().raw()).into());
            };
            let free = u64::from(region.block_count()).saturating_sub(inner.counters.outstanding());
            if !inner.residue.is_empty() && free == 0 {
                tracing::debug!(session_id = %session.id(), residue = inner.residue.len(), "no ring slot for final block");
                return Err(StreamError::InsufficientSpace {
                    session: session.id().raw(),
                    free: 0,
                }
                .into());
            }
            let residue = std::mem::take(&mut inner.residue);
            let final_len = u32::try_from(residue.len()).unwrap_or(u32::MAX);
            if final_len > 0 {
                region.commit_block(&residue);
                inner.counters.produce(1);
            }
            region.mark_final(final_len);
            inner.drain.requested = true;
            inner.drain.consumed = false;
            final_len
        };
        tracing::debug!(session_id = %session.id(), final_len, "drain requested");

        if let Err(e) = core.request(session, Request::Drain { final_len }) {
            let mut inner = session.lock();
            inner.drain.requested = false;
            if let Some(region) = inner.region.as_mut() {
                region.clear_final();
            }
            return Err(e);
        }
        session.emit(StreamEvent::TransitionAck { op: StreamOp::Drain });
        Ok(())
    }

    /// Switch to the next track once the drained block has been consumed.
    ///
    /// # Errors
    ///
    /// `Timeout` if the drained block is not consumed within
    /// `drain_timeout`, otherwise as [`Self::drain`].
    pub fn next_track(&self, session: &Session) -> Result<()> {
        let core = &self.inner;
        core.ensure_live(session)?;
        require_drain(session, StreamOp::NextTrack)?;
        let _op = session.begin_op(StreamOp::NextTrack.as_str())?;
        session.state().transition(StreamOp::NextTrack)?;

        let waiter = {
            let mut inner = session.lock();
            if inner.drain.requested && !inner.drain.consumed {
                let (tx, rx) = channel::bounded(1);
                inner.drain.waiter = Some(tx);
                Some(rx)
            } else {
                None
            }
        };
        if let Some(rx) = waiter {
            let op = StreamOp::NextTrack.as_str();
            match rx.recv_timeout(core.config.drain_timeout) {
                Ok(()) => {}
                Err(RecvTimeoutError::Timeout) => {
                    session.lock().drain.waiter = None;
                    let timeout_ms = u64::try_from(core.config.drain_timeout.as_millis()).unwrap_or(u64::MAX);
                    tracing::warn!(session_id = %session.id(), timeout_ms, "drained block not consumed");
                    return Err(StreamError::timeout(session.id().raw(), op, timeout_ms).into());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(StreamError::aborted(session.id().raw(), op).into());
                }
            }
        }

        core.request(session, Request::NextTrack)?;
        {
            let mut inner = session.lock();
            inner.drain = Default::default();
            if let Some(region) = inner.region.as_mut() {
                region.clear_final();
            }
        }
        session.emit(StreamEvent::TransitionAck {
            op: StreamOp::NextTrack,
        });
        Ok(())
    }
}

fn require_drain(session: &Session, op: StreamOp) -> Result<()> {
    if session.scene().supports_drain() {
        return Ok(());
    }
    Err(AdspError::from(ValidationError::UnsupportedByScene {
        scene: session.scene().as_str(),
        op: op.as_str(),
    }))
}
