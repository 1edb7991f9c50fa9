//! Stream registry.
//!
//! One mutex guards the session map. It is held only for lookups and map
//! mutation; resets that join pipeline workers run after it is released.

use std::collections::BTreeMap;

use adsp_errors::{AdspError, Result, StreamError, ValidationError};
use adsp_protocol::{SceneType, SessionId};
use adsp_recovery::DspReachability;
use parking_lot::Mutex;

use crate::session::Session;

/// Outcome of [`StreamRegistry::idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdleReport {
    /// False when the session had already been idled.
    pub was_in_use: bool,
    /// The session still held a power vote the caller must release.
    pub held_vote: bool,
}

pub struct StreamRegistry {
    sessions: Mutex<BTreeMap<SessionId, Session>>,
    max_sessions: usize,
    reachability: DspReachability,
}

impl StreamRegistry {
    pub fn new(max_sessions: usize, reachability: DspReachability) -> Self {
        Self {
            sessions: Mutex::new(BTreeMap::new()),
            max_sessions,
            reachability,
        }
    }

    /// Allocate the session for `id`, or re-arm it if it was idled.
    ///
    /// # Errors
    ///
    /// - `Unavailable` while the DSP is unreachable
    /// - `InvalidSessionId` if `id` is not in the scene table
    /// - `Duplicate` if a live session already uses `id`
    /// - `ResourceExhausted` at capacity
    pub fn alloc(&self, id: SessionId) -> Result<Session> {
        if !self.reachability.is_reachable() {
            return Err(AdspError::unavailable(format!(
                "cannot allocate session {id} while the DSP is recovering"
            )));
        }
        let info = id
            .resolve()
            .map_err(|e| ValidationError::invalid_session_id(id.raw(), e.to_string()))?;

        let mut sessions = self.sessions.lock();
        if let Some(existing) = sessions.get(&id) {
            if !existing.rearm() {
                return Err(StreamError::Duplicate(id.raw()).into());
            }
            tracing::debug!(session_id = %id, "idled session re-allocated");
            return Ok(existing.clone());
        }
        if sessions.len() >= self.max_sessions {
            return Err(StreamError::ResourceExhausted(self.max_sessions).into());
        }
        let session = Session::new(id, info);
        sessions.insert(id, session.clone());
        tracing::info!(session_id = %id, scene = %info.scene, instance = info.instance, "session allocated");
        Ok(session)
    }

    /// Live (not idled) session with this id.
    pub fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions
            .lock()
            .get(&id)
            .filter(|s| s.is_in_use())
            .cloned()
    }

    /// Session addressed by `(scene, instance)`, only while it is active.
    pub fn get_by_scene(&self, scene: SceneType, instance: u8) -> Option<Session> {
        let id = SessionId::from_raw((u16::from(scene.category()) << 8) | u16::from(instance));
        self.sessions
            .lock()
            .get(&id)
            .filter(|s| s.is_active())
            .cloned()
    }

    /// Reset every mutable field and drop the session from the live count
    /// without freeing it. Calling it twice is the same as calling it once.
    pub fn idle(&self, session: &Session) -> IdleReport {
        match session.reset_for_idle() {
            Some(held_vote) => {
                tracing::info!(session_id = %session.id(), "session idled");
                IdleReport {
                    was_in_use: true,
                    held_vote,
                }
            }
            None => IdleReport::default(),
        }
    }

    /// Re-arm an idled session for another alloc/release cycle.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the session has been freed.
    pub fn prepare(&self, session: &Session) -> Result<()> {
        if session.is_freed() {
            return Err(StreamError::NotFound(session.id().raw()).into());
        }
        if session.rearm() {
            tracing::debug!(session_id = %session.id(), "session re-armed");
        }
        Ok(())
    }

    /// Remove the session. It must be Idle.
    ///
    /// # Errors
    ///
    /// Returns `NotIdle` if the owner has not driven it back to Idle, or
    /// `NotFound` if it is not registered.
    pub fn free(&self, session: &Session) -> Result<IdleReport> {
        let state = session.state();
        if state.is_active() {
            return Err(StreamError::NotIdle {
                session: session.id().raw(),
                state: state.as_str(),
            }
            .into());
        }
        let removed = {
            let mut sessions = self.sessions.lock();
            let registered = sessions
                .get(&session.id())
                .is_some_and(|existing| existing.ptr_eq(session));
            if registered {
                sessions.remove(&session.id())
            } else {
                None
            }
        };
        let Some(removed) = removed else {
            return Err(StreamError::NotFound(session.id().raw()).into());
        };
        let report = self.idle(&removed);
        removed.mark_freed();
        tracing::info!(session_id = %removed.id(), "session freed");
        Ok(report)
    }

    /// Sessions not idled.
    pub fn live_count(&self) -> usize {
        self.sessions.lock().values().filter(|s| s.is_in_use()).count()
    }

    /// Every registered session, idled ones included, in id order.
    pub fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.max_sessions
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("registered", &self.sessions.lock().len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adsp_errors::ErrorCategory;

    fn registry() -> StreamRegistry {
        StreamRegistry::new(4, DspReachability::new())
    }

    fn id(raw: u16) -> SessionId {
        SessionId::from_raw(raw)
    }

    #[test]
    fn duplicate_alloc_fails() {
        let reg = registry();
        assert!(reg.alloc(id(0x0901)).is_ok());
        let err = reg.alloc(id(0x0901)).err();
        assert_eq!(
            err.as_ref().and_then(AdspError::as_stream),
            Some(&StreamError::Duplicate(0x0901))
        );
        assert_eq!(reg.live_count(), 1);
    }

    #[test]
    fn invalid_id_rejected_before_registration() {
        let reg = registry();
        // OffloadPlay has two instances.
        let err = reg.alloc(id(0x0902)).err();
        assert_eq!(err.map(|e| e.category()), Some(ErrorCategory::InvalidArgument));
        assert!(reg.sessions().is_empty());
    }

    #[test]
    fn alloc_fails_while_unreachable() {
        let reachability = DspReachability::new();
        let reg = StreamRegistry::new(4, reachability.clone());
        reachability.mark_unreachable();
        assert!(matches!(reg.alloc(id(0x0000)), Err(AdspError::Unavailable(_))));
        reachability.mark_reachable();
        assert!(reg.alloc(id(0x0000)).is_ok());
    }

    #[test]
    fn capacity_is_enforced() {
        let reg = StreamRegistry::new(1, DspReachability::new());
        assert!(reg.alloc(id(0x0000)).is_ok());
        let err = reg.alloc(id(0x0001)).err();
        assert_eq!(
            err.as_ref().and_then(AdspError::as_stream),
            Some(&StreamError::ResourceExhausted(1))
        );
    }

    #[test]
    fn lookup_by_scene_requires_active() {
        let reg = registry();
        let s = match reg.alloc(id(0x0901)) {
            Ok(s) => s,
            Err(e) => panic!("alloc failed: {e}"),
        };
        assert!(reg.get_by_scene(SceneType::OffloadPlay, 1).is_none());
        s.set_active(true);
        let found = reg.get_by_scene(SceneType::OffloadPlay, 1);
        assert!(found.is_some_and(|f| f.ptr_eq(&s)));
        assert!(reg.get_by_scene(SceneType::OffloadPlay, 0).is_none());
    }

    #[test]
    fn idle_twice_equals_idle_once() {
        let reg = registry();
        let s = match reg.alloc(id(0x0100)) {
            Ok(s) => s,
            Err(e) => panic!("alloc failed: {e}"),
        };
        let first = reg.idle(&s);
        let after_once = s.snapshot();
        let second = reg.idle(&s);
        assert!(first.was_in_use);
        assert_eq!(second, IdleReport::default());
        assert_eq!(s.snapshot(), after_once);
        assert_eq!(reg.live_count(), 0);
        assert!(reg.get(id(0x0100)).is_none());
    }

    #[test]
    fn idled_session_is_reused() {
        let reg = registry();
        let first = match reg.alloc(id(0x0100)) {
            Ok(s) => s,
            Err(e) => panic!("alloc failed: {e}"),
        };
        reg.idle(&first);
        let again = match reg.alloc(id(0x0100)) {
            Ok(s) => s,
            Err(e) => panic!("re-alloc failed: {e}"),
        };
        assert!(again.ptr_eq(&first));
        assert_eq!(reg.live_count(), 1);
    }

    #[test]
    fn free_requires_idle() {
        let reg = registry();
        let s = match reg.alloc(id(0x0000)) {
            Ok(s) => s,
            Err(e) => panic!("alloc failed: {e}"),
        };
        s.lock().state = crate::state::StreamState::Prepared;
        assert_eq!(
            reg.free(&s).err().as_ref().and_then(AdspError::as_stream),
            Some(&StreamError::NotIdle {
                session: 0x0000,
                state: "Prepared"
            })
        );
        s.lock().state = crate::state::StreamState::Idle;
        assert!(reg.free(&s).is_ok());
        assert!(s.is_freed());
        assert!(reg.sessions().is_empty());
        assert!(matches!(reg.prepare(&s), Err(AdspError::Stream(StreamError::NotFound(0)))));
    }
}
