//! Control requests, global requests and inbound dispatch.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use adsp_core::{DiagnosticHook, StreamEvent};
use adsp_errors::{AdspError, StreamError, ValidationError};
use adsp_protocol::{
    Address, Function, MAX_PARAM_LEN, Message, Notification, Reply, Request, RouteId, SessionId,
    StreamTimestamp,
};
use adsp_test_helpers::prelude::*;
use common::*;
use parking_lot::Mutex;

#[test]
fn rtc_and_ping_use_the_global_address() {
    let h = Harness::new();
    h.dsp.set_rtc(42_000);

    assert_eq!(must(h.core.get_rtc()), 42_000);
    must(h.core.ping());
    let frames = h.dsp.sent_frames();
    assert_eq!(frames.len(), 2);
    assert!(frames.iter().all(|f| f.address() == Address::GLOBAL));
}

#[test]
fn rtc_timeout_reports_global_session() {
    let h = Harness::new();
    h.dsp.script(Function::GetRtc, Script::Silent);

    let err = must_err(h.core.get_rtc());
    assert!(matches!(
        err.as_stream(),
        Some(StreamError::Timeout {
            session: 0xFFFF,
            op: "get_rtc",
            ..
        })
    ));
    h.dsp.script(Function::GetRtc, Script::Ack);
    must(h.core.get_rtc());
}

#[test]
fn timestamp_round_trip() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    let ts = StreamTimestamp {
        frames: 48_000,
        dsp_time_us: 1_000_123,
    };
    h.dsp.set_timestamp(ts);

    assert_eq!(must(h.core.get_timestamp(&session)), ts);
}

#[test]
fn control_requests_need_an_active_session() {
    let h = Harness::new();
    let session = must(h.core.alloc(OFFLOAD));

    assert!(matches!(
        h.core.set_volume(&session, -600),
        Err(AdspError::Stream(StreamError::IllegalTransition {
            op: "set_volume",
            state: "Idle"
        }))
    ));
    assert_eq!(h.dsp.sent_count(), 0);
}

#[test]
fn params_echo_through_the_dsp() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);

    must(h.core.set_param(&session, 0x1001, &[1, 2, 3, 4]));
    assert_eq!(must(h.core.get_param(&session, 0x1001)), vec![1, 2, 3, 4]);
    assert!(h.dsp.sent_requests().contains(&Request::SetParam {
        param_id: 0x1001,
        data: vec![1, 2, 3, 4]
    }));
}

#[test]
fn oversized_param_is_rejected_locally() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);
    let sent = h.dsp.sent_count();

    assert!(matches!(
        h.core.set_param(&session, 1, &vec![0; MAX_PARAM_LEN + 1]),
        Err(AdspError::Validation(ValidationError::PayloadTooLarge { .. }))
    ));
    assert_eq!(h.dsp.sent_count(), sent);
}

#[test]
fn mute_is_voice_only() {
    let h = Harness::new();
    let music = h.running(OFFLOAD);
    let call = h.running(VOICE_CALL_PLAY);

    assert!(matches!(
        h.core.set_mute(&music, true),
        Err(AdspError::Validation(ValidationError::UnsupportedByScene {
            op: "set_mute",
            ..
        }))
    ));
    must(h.core.set_mute(&call, true));
    assert!(h.dsp.sent_requests().contains(&Request::SetMute { muted: true }));
}

#[test]
fn keyword_detection_and_rearm() {
    let h = Harness::new();
    let session = h.running(KWS);
    let events = record_events(&session);

    h.dsp.notify(session.address(), Notification::KeywordDetected { keyword: 5 });
    assert!(wait_until(Duration::from_secs(1), || {
        events.lock().contains(&StreamEvent::KeywordDetected { keyword: 5 })
    }));
    must(h.core.rearm_keyword(&session));

    let music = h.running(OFFLOAD);
    assert!(matches!(
        h.core.rearm_keyword(&music),
        Err(AdspError::Validation(ValidationError::UnsupportedByScene { .. }))
    ));
}

#[test]
fn dsp_events_reach_the_owner() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    let events = record_events(&session);

    h.dsp.notify(session.address(), Notification::StreamEvent { code: 0x33 });
    assert!(wait_until(Duration::from_secs(1), || {
        events.lock().contains(&StreamEvent::DspEvent { code: 0x33 })
    }));
}

#[test]
fn primary_route_cannot_be_removed() {
    let h = Harness::new();
    let session = must(h.core.alloc(NORMAL_PLAY));
    must(h.core.startup(&session, stream_config(pcm()).with_extra_route(RouteId(5))));

    assert!(matches!(
        h.core.remove_route(&session, RouteId(1)),
        Err(AdspError::Validation(ValidationError::UnsupportedFormat { .. }))
    ));
    assert!(matches!(
        h.core.remove_route(&session, RouteId(9)),
        Err(AdspError::Validation(ValidationError::UnsupportedFormat { .. }))
    ));
    must(h.core.remove_route(&session, RouteId(5)));
    assert_eq!(session.back_ends().len(), 1);
    assert!(h.dsp.sent_requests().contains(&Request::RemovePath { route: RouteId(5) }));
}

#[test]
fn malformed_frames_are_counted_and_dropped() {
    let h = Harness::new();
    let mut bytes = [0u8; adsp_protocol::FRAME_SIZE];
    if let Some(command) = bytes.get_mut(2) {
        *command = 0xEE;
    }
    h.dsp.inject_raw(bytes);
    h.core.on_frame(&[1, 2, 3]);

    assert!(wait_until(Duration::from_secs(1), || h.core.stats().frames_dropped == 2));
    assert_eq!(h.core.stats().frames_received, 2);
}

#[test]
fn stray_reply_is_counted() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);
    let frame = must(Message::Reply(Reply::ack(Function::Start)).encode(session.address()));

    h.core.on_frame(&frame.to_bytes());
    assert_eq!(h.core.stats().unmatched_replies, 1);
    assert_eq!(session.state(), adsp_core::StreamState::Prepared);
}

#[test]
fn notification_for_unknown_session_is_dropped() {
    let h = Harness::new();
    let frame = must(
        Message::Notification(Notification::BufferDone { bytes: 64 })
            .encode(Address::new(0x02, 0)),
    );

    h.core.on_frame(&frame.to_bytes());
    assert_eq!(h.core.stats().frames_dropped, 1);
    assert!(h.core.get(SessionId::from_raw(0x0200)).is_none());
}

#[derive(Default)]
struct RecordingHook {
    timeouts: Mutex<Vec<(Option<SessionId>, Function)>>,
    calls: AtomicU32,
}

impl DiagnosticHook for RecordingHook {
    fn on_timeout(&self, session: Option<SessionId>, function: Function) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.timeouts.lock().push((session, function));
    }
}

#[test]
fn timeouts_trigger_the_diagnostic_hook() {
    init_test_tracing();
    let dsp = ScriptedDsp::new();
    let hook = Arc::new(RecordingHook::default());
    let core = must(
        adsp_core::AudioCore::builder()
            .config(fast_config())
            .channel(dsp.clone())
            .power(Arc::new(MockPowerController::new()))
            .repair(Arc::new(ImmediateRepair::new()))
            .diagnostics(hook.clone())
            .build(),
    );
    dsp.connect(core.frame_sink());
    dsp.script(Function::Start, Script::Silent);
    dsp.script(Function::Ping, Script::Silent);

    let session = must(core.alloc(OFFLOAD));
    must(core.startup(&session, stream_config(pcm())));
    assert!(matches!(
        core.start(&session),
        Err(AdspError::Stream(StreamError::Timeout { .. }))
    ));
    assert!(matches!(
        core.ping(),
        Err(AdspError::Stream(StreamError::Timeout { .. }))
    ));

    assert_eq!(hook.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *hook.timeouts.lock(),
        vec![(Some(OFFLOAD), Function::Start), (None, Function::Ping)]
    );
}

#[test]
fn refused_send_leaves_no_pending_request() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);
    h.dsp.refuse_sends(true);

    assert!(matches!(h.core.start(&session), Err(AdspError::Channel(_))));
    assert_eq!(session.in_flight(), None);
    h.dsp.refuse_sends(false);
    must(h.core.start(&session));
}
