//! Inbound frame dispatch.
//!
//! Runs on the transport's receive context. Replies complete the matching
//! pending operation, notifications drive accounting and owner callbacks,
//! and fault reports hand over to the fault path. Nothing here blocks on
//! the DSP.

use adsp_protocol::{Address, Frame, Function, Message, Notification, Reply, SceneType};

use crate::context::{CoreInner, Counters};
use crate::session::{Session, StreamEvent};

impl CoreInner {
    pub(crate) fn on_frame(&self, bytes: &[u8]) {
        Counters::bump(&self.counters.frames_received);
        let message = match Frame::from_bytes(bytes).and_then(|frame| {
            let address = frame.address();
            Message::decode(&frame).map(|message| (address, message))
        }) {
            Ok(decoded) => decoded,
            Err(e) => {
                Counters::bump(&self.counters.frames_dropped);
                tracing::warn!(len = bytes.len(), error = %e, "dropping malformed frame");
                return;
            }
        };

        match message {
            (_, Message::Request(request)) => {
                Counters::bump(&self.counters.frames_dropped);
                tracing::warn!(op = request.function().as_str(), "dropping request frame from DSP");
            }
            (_, Message::Notification(Notification::FaultReport { reason })) => {
                self.handle_fault(reason);
            }
            (_, Message::Reply(reply)) if is_global(reply.function) => self.on_global_reply(reply),
            (address, Message::Reply(reply)) => match self.session_at(address) {
                Some(session) => {
                    if !session.complete(reply.clone()) {
                        self.unmatched(Some(&session), &reply);
                    }
                }
                None => self.unmatched(None, &reply),
            },
            (address, Message::Notification(notification)) => match self.session_at(address) {
                Some(session) => self.on_notification(&session, notification),
                None => {
                    Counters::bump(&self.counters.frames_dropped);
                    tracing::debug!(
                        scene_type = address.scene_type,
                        instance = address.instance_id,
                        op = notification.function().as_str(),
                        "notification for inactive session dropped"
                    );
                }
            },
        }
    }

    fn session_at(&self, address: Address) -> Option<Session> {
        let scene = SceneType::from_category(address.scene_type)?;
        self.registry.get_by_scene(scene, address.instance_id)
    }

    fn on_global_reply(&self, reply: Reply) {
        let op = self.global_pending.lock().take_matching(&reply);
        match op {
            Some(op) => op.complete(reply),
            None => self.unmatched(None, &reply),
        }
    }

    fn unmatched(&self, session: Option<&Session>, reply: &Reply) {
        Counters::bump(&self.counters.unmatched_replies);
        tracing::warn!(
            session_id = session.map(|s| s.id().raw()),
            op = reply.function.as_str(),
            result_code = reply.result_code,
            "reply matches no pending request"
        );
    }

    fn on_notification(&self, session: &Session, notification: Notification) {
        match notification {
            Notification::BufferDone { bytes } => {
                if session.has_pipeline() {
                    tracing::trace!(session_id = %session.id(), bytes, "buffer done ignored, pipeline accounts blocks");
                } else {
                    session.on_buffer_done(bytes);
                }
            }
            Notification::LastBlockConsumed => {
                let waiter = {
                    let mut inner = session.lock();
                    inner.drain.consumed = true;
                    inner.drain.waiter.take()
                };
                if let Some(waiter) = waiter {
                    if waiter.try_send(()).is_err() {
                        tracing::debug!(session_id = %session.id(), "next-track waiter already gone");
                    }
                }
                tracing::debug!(session_id = %session.id(), "drained block consumed");
                session.emit(StreamEvent::DrainComplete);
            }
            Notification::StreamEvent { code } => {
                session.emit(StreamEvent::DspEvent { code });
            }
            Notification::KeywordDetected { keyword } => {
                tracing::info!(session_id = %session.id(), keyword, "keyword detected");
                session.emit(StreamEvent::KeywordDetected { keyword });
            }
            Notification::FaultReport { reason } => self.handle_fault(reason),
        }
    }
}

fn is_global(function: Function) -> bool {
    matches!(function, Function::GetRtc | Function::Ping)
}
