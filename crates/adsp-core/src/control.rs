//! Control operations on an active session.
//!
//! None of these change the lifecycle state. They share the session's
//! single pending slot with lifecycle operations, so a control request
//! issued while another request is in flight fails with `Busy`.

use adsp_errors::{AdspError, Result, StreamError, ValidationError};
use adsp_protocol::{Direction, MAX_PARAM_LEN, ReplyBody, Request, RouteId, StreamTimestamp};

use crate::context::AudioCore;
use crate::session::Session;

impl AudioCore {
    /// Claim an active session for a control request and send it.
    fn control(&self, session: &Session, op: &'static str, request: Request) -> Result<ReplyBody> {
        let core = &self.inner;
        if session.is_freed() || !session.is_in_use() {
            return Err(StreamError::NotFound(session.id().raw()).into());
        }
        core.ensure_reachable()?;
        let _op = session.begin_op(op)?;
        let state = session.state();
        if !state.is_active() {
            return Err(StreamError::illegal(op, state.as_str()).into());
        }
        core.request(session, request)
    }

    fn require_scene(&self, session: &Session, supported: bool, op: &'static str) -> Result<()> {
        if supported {
            return Ok(());
        }
        Err(ValidationError::UnsupportedByScene {
            scene: session.scene().as_str(),
            op,
        }
        .into())
    }

    /// Current rendering (or capture) position.
    ///
    /// # Errors
    ///
    /// Illegal in Idle; otherwise fails like any request.
    pub fn get_timestamp(&self, session: &Session) -> Result<StreamTimestamp> {
        match self.control(session, "get_timestamp", Request::GetTimestamp)? {
            ReplyBody::Timestamp(ts) => Ok(ts),
            other => Err(AdspError::Protocol(format!(
                "unexpected get_timestamp reply body {other:?}"
            ))),
        }
    }

    /// Set an opaque module parameter.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if `data` does not fit in one frame.
    pub fn set_param(&self, session: &Session, param_id: u32, data: &[u8]) -> Result<()> {
        if data.len() > MAX_PARAM_LEN {
            return Err(ValidationError::PayloadTooLarge {
                len: data.len(),
                max: MAX_PARAM_LEN,
            }
            .into());
        }
        self.control(
            session,
            "set_param",
            Request::SetParam {
                param_id,
                data: data.to_vec(),
            },
        )?;
        tracing::debug!(session_id = %session.id(), param_id, len = data.len(), "parameter set");
        Ok(())
    }

    /// # Errors
    ///
    /// Illegal in Idle; otherwise fails like any request.
    pub fn get_param(&self, session: &Session, param_id: u32) -> Result<Vec<u8>> {
        match self.control(session, "get_param", Request::GetParam { param_id })? {
            ReplyBody::Param(data) => Ok(data),
            ReplyBody::Empty => Ok(Vec::new()),
            other => Err(AdspError::Protocol(format!(
                "unexpected get_param reply body {other:?}"
            ))),
        }
    }

    /// Stream gain in millibels.
    ///
    /// # Errors
    ///
    /// Illegal in Idle; otherwise fails like any request.
    pub fn set_volume(&self, session: &Session, gain_mb: i16) -> Result<()> {
        self.control(session, "set_volume", Request::SetVolume { gain_mb })?;
        Ok(())
    }

    /// Uplink mute. Real-time voice scenes only.
    ///
    /// # Errors
    ///
    /// `UnsupportedByScene` on other scenes.
    pub fn set_mute(&self, session: &Session, muted: bool) -> Result<()> {
        self.require_scene(session, session.scene().is_realtime_voice(), "set_mute")?;
        self.control(session, "set_mute", Request::SetMute { muted })?;
        tracing::info!(session_id = %session.id(), muted, "mute changed");
        Ok(())
    }

    /// Re-arm detection after a keyword event. Keyword scenes only.
    ///
    /// # Errors
    ///
    /// `UnsupportedByScene` on other scenes.
    pub fn rearm_keyword(&self, session: &Session) -> Result<()> {
        self.require_scene(
            session,
            session.scene().is_keyword_spotting(),
            "rearm_keyword",
        )?;
        self.control(session, "rearm_keyword", Request::RearmKeyword)?;
        Ok(())
    }

    /// Tear down a secondary route. The primary route goes away with
    /// `shutdown` only.
    ///
    /// # Errors
    ///
    /// `UnsupportedFormat` for the primary route or a route the session
    /// does not carry.
    pub fn remove_route(&self, session: &Session, route: RouteId) -> Result<()> {
        let position = {
            let inner = session.lock();
            inner.backends.iter().position(|b| b.route == route)
        };
        match position {
            None => {
                return Err(ValidationError::unsupported_format(
                    "route",
                    format!("route {} is not configured on {}", route.0, session.id()),
                )
                .into());
            }
            Some(i) if i < primary_routes(session) => {
                return Err(ValidationError::unsupported_format(
                    "route",
                    "the primary route is removed by shutdown",
                )
                .into());
            }
            Some(_) => {}
        }
        self.control(session, "remove_route", Request::RemovePath { route })?;
        session.lock().backends.retain(|b| b.route != route);
        tracing::info!(session_id = %session.id(), route = route.0, "route removed");
        Ok(())
    }
}

/// Routes configured by `startup` itself.
fn primary_routes(session: &Session) -> usize {
    match session.direction() {
        Direction::Duplex => 2,
        Direction::Playback | Direction::Capture => 1,
    }
}
