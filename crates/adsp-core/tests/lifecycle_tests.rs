//! Lifecycle integration tests against a scripted DSP.

mod common;

use std::time::{Duration, Instant};

use adsp_core::{StreamEvent, StreamOp, StreamState};
use adsp_errors::{AdspError, ErrorCategory, StreamError, ValidationError};
use adsp_protocol::{Function, Notification, Request, RouteId, SampleFormat, VoterId};
use adsp_test_helpers::prelude::*;
use common::*;

#[test]
fn offload_playback_round_trip() {
    let h = Harness::new();
    h.dsp.consume_data(true);
    let session = must(h.core.alloc(OFFLOAD));
    let events = record_events(&session);

    must(h.core.startup(&session, stream_config(SampleFormat::pcm(48_000, 2, 16))));
    assert_eq!(session.state(), StreamState::Prepared);
    assert!(session.is_attached());
    must(h.core.start(&session));
    assert_eq!(session.state(), StreamState::Running);

    let before = session.counters().produced();
    let period = vec![0x5a; (BLOCK * 2) as usize];
    assert_eq!(must(h.core.write(&session, &period)), period.len());
    assert_eq!(session.counters().produced(), before + 2);

    assert!(wait_until(Duration::from_secs(1), || {
        session.counters().released() == session.counters().produced()
    }));
    assert_eq!(buffer_done_bytes(&events), vec![BLOCK * 2]);

    must(h.core.stop(&session));
    assert_eq!(session.state(), StreamState::Prepared);
    let head = must_some(session.region_head(), "region configured");
    assert_eq!(head.read_cursor, 0);
    assert_eq!(head.write_cursor, 0);
    assert_eq!(session.counters().produced(), 0);
    assert_eq!(
        h.dsp.sent_functions(),
        vec![
            Function::Startup,
            Function::Start,
            Function::DataNotify,
            Function::Pause,
            Function::Flush,
            Function::Stop,
        ]
    );
}

#[test]
fn startup_timeout_leaves_session_idle() {
    let h = Harness::new();
    h.dsp.script(Function::Startup, Script::Silent);
    let session = must(h.core.alloc(OFFLOAD));

    let err = must_err(h.core.startup(&session, stream_config(pcm())));
    assert!(matches!(err.as_stream(), Some(StreamError::Timeout { op: "startup", .. })));
    assert_eq!(err.category(), ErrorCategory::ProtocolTimeout);
    assert_eq!(session.state(), StreamState::Idle);
    assert_eq!(session.in_flight(), None);
    assert!(!session.is_active());
    assert_eq!(h.core.power().live_votes(), 0);
    assert_eq!(h.core.stats().timeouts, 1);
}

#[test]
fn illegal_transition_sends_nothing() {
    let h = Harness::new();
    let session = must(h.core.alloc(OFFLOAD));

    let err = must_err(h.core.resume(&session));
    assert!(matches!(
        err.as_stream(),
        Some(StreamError::IllegalTransition {
            op: "resume",
            state: "Idle"
        })
    ));
    assert_eq!(h.dsp.sent_count(), 0);
}

#[test]
fn peer_failure_rolls_back_start() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);
    h.dsp.script(Function::Start, Script::Fail(3));

    let err = must_err(h.core.start(&session));
    assert!(matches!(
        err.as_stream(),
        Some(StreamError::PeerFailure { op: "start", code: 3, .. })
    ));
    assert_eq!(session.state(), StreamState::Prepared);
    assert_eq!(h.core.stats().peer_failures, 1);

    h.dsp.script(Function::Start, Script::Ack);
    must(h.core.start(&session));
    assert_eq!(session.state(), StreamState::Running);
}

#[test]
fn failed_startup_releases_vote() {
    let h = Harness::new();
    h.dsp.script(Function::Startup, Script::Fail(1));
    let session = must(h.core.alloc(OFFLOAD));

    assert!(matches!(
        h.core.startup(&session, stream_config(pcm())),
        Err(AdspError::Stream(StreamError::PeerFailure { .. }))
    ));
    assert_eq!(h.core.power().live_votes(), 0);
    assert_eq!(h.power.on_count(), 1);
    assert_eq!(h.power.off_count(), 1);
    assert!(session.region_head().is_none());
}

#[test]
fn unsupported_format_never_reaches_the_wire() {
    let h = Harness::new();
    let session = must(h.core.alloc(OFFLOAD));

    let err = must_err(h.core.startup(&session, stream_config(SampleFormat::pcm(12_345, 2, 16))));
    assert!(matches!(
        err,
        AdspError::Validation(ValidationError::UnsupportedFormat { .. })
    ));
    assert_eq!(h.dsp.sent_count(), 0);
    assert_eq!(h.power.on_count(), 0);
}

#[test]
fn duplex_scene_requires_output_route() {
    let h = Harness::new();
    let session = must(h.core.alloc(FM_DUPLEX));

    assert!(matches!(
        h.core.startup(&session, stream_config(pcm())),
        Err(AdspError::Validation(ValidationError::Required(_)))
    ));
    must(h.core.startup(&session, stream_config(pcm()).with_output_route(RouteId(7))));
    let routes: Vec<_> = session.back_ends().iter().map(|b| b.route).collect();
    assert_eq!(routes, vec![RouteId(1), RouteId(7)]);
}

#[test]
fn startup_holds_one_vote_until_shutdown() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);
    let voter = VoterId::from(OFFLOAD);

    assert_eq!(h.core.power().live_votes(), 1);
    assert!(h.core.power().is_powered());
    assert!(must_some(h.core.power().record(voter), "vote record").wants_power);

    must(h.core.shutdown(&session));
    assert_eq!(session.state(), StreamState::Idle);
    assert!(!session.is_attached());
    assert_eq!(h.core.power().live_votes(), 0);
    assert_eq!(h.power.off_count(), 1);
}

#[test]
fn shutdown_failure_reattaches_front_end() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    h.dsp.script(Function::Shutdown, Script::Fail(2));

    assert!(matches!(
        h.core.shutdown(&session),
        Err(AdspError::Stream(StreamError::PeerFailure { .. }))
    ));
    assert_eq!(session.state(), StreamState::Running);
    assert!(session.is_attached());
    assert_eq!(h.core.power().live_votes(), 1);
}

#[test]
fn second_request_on_busy_session_is_refused() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);
    h.dsp.script(
        Function::Start,
        Script::Delayed(Duration::from_millis(100), Box::new(Script::Ack)),
    );

    std::thread::scope(|scope| {
        let starter = scope.spawn(|| h.core.start(&session));
        assert!(wait_until(Duration::from_secs(1), || session.in_flight().is_some()));
        assert!(matches!(
            h.core.pause(&session),
            Err(AdspError::Stream(StreamError::Busy { pending: "start", .. }))
        ));
        assert!(matches!(starter.join(), Ok(Ok(()))));
    });
    assert_eq!(session.state(), StreamState::Running);
}

#[test]
fn flush_while_running_pauses_and_resumes() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.core.write(&session, &vec![1; (BLOCK + 10) as usize]));
    assert_eq!(session.residue_len(), 10);
    h.dsp.clear_sent();

    must(h.core.flush(&session));
    assert_eq!(session.state(), StreamState::Running);
    assert_eq!(session.residue_len(), 0);
    assert_eq!(session.counters().produced(), 0);
    assert_eq!(
        h.dsp.sent_functions(),
        vec![Function::Pause, Function::Flush, Function::Resume]
    );
}

#[test]
fn flush_failure_keeps_pause() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    h.dsp.script(Function::Flush, Script::Fail(9));

    assert!(matches!(
        h.core.flush(&session),
        Err(AdspError::Stream(StreamError::PeerFailure { op: "flush", .. }))
    ));
    assert_eq!(session.state(), StreamState::Paused);
}

#[test]
fn voice_stop_is_a_single_request() {
    let h = Harness::new();
    let session = h.running(VOICE_CALL_PLAY);
    h.dsp.clear_sent();

    must(h.core.stop(&session));
    assert_eq!(h.dsp.sent_functions(), vec![Function::Stop]);
    assert_eq!(session.state(), StreamState::Prepared);
}

#[test]
fn failed_secondary_route_is_disabled_not_fatal() {
    let h = Harness::new();
    h.dsp.script(Function::AddPath, Script::Fail(4));
    let session = must(h.core.alloc(NORMAL_PLAY));

    let config = stream_config(pcm())
        .with_extra_route(RouteId(2))
        .with_extra_route(RouteId(3));
    must(h.core.startup(&session, config));
    assert_eq!(session.state(), StreamState::Prepared);

    let back_ends = session.back_ends();
    assert_eq!(back_ends.len(), 3);
    assert!(back_ends.first().is_some_and(|b| b.enabled));
    assert!(back_ends.iter().skip(1).all(|b| !b.enabled));
    assert_eq!(
        h.dsp.sent_functions(),
        vec![Function::Startup, Function::AddPath, Function::AddPath]
    );
}

#[test]
fn drain_then_next_track() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    let events = record_events(&session);
    must(h.core.write(&session, &vec![3; (BLOCK + 100) as usize]));

    must(h.core.drain(&session));
    let head = must_some(session.region_head(), "region configured");
    assert!(head.is_final());
    assert_eq!(head.final_len, 100);
    assert_eq!(session.residue_len(), 0);
    assert_eq!(session.counters().produced(), 2);
    assert!(h.dsp.sent_requests().contains(&Request::Drain { final_len: 100 }));

    let dsp = h.dsp.clone();
    let address = session.address();
    let notifier = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        dsp.notify(address, Notification::LastBlockConsumed);
    });
    must(h.core.next_track(&session));
    assert!(matches!(notifier.join(), Ok(())));

    assert!(!must_some(session.region_head(), "region configured").is_final());
    let events = events.lock();
    assert!(events.contains(&StreamEvent::DrainComplete));
    assert!(events.contains(&StreamEvent::TransitionAck {
        op: StreamOp::NextTrack
    }));
}

#[test]
fn drain_waits_for_a_free_block_when_ring_is_full() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.core.write(&session, &vec![1; (BLOCK * BLOCKS + 100) as usize]));
    assert_eq!(session.counters().outstanding(), u64::from(BLOCKS));
    let sent = h.dsp.sent_count();

    let err = must_err(h.core.drain(&session));
    assert!(matches!(
        err.as_stream(),
        Some(StreamError::InsufficientSpace { free: 0, .. })
    ));
    assert_eq!(session.state(), StreamState::Running);
    assert_eq!(session.counters().produced(), u64::from(BLOCKS));
    assert_eq!(session.residue_len(), 100);
    assert!(!must_some(session.region_head(), "region configured").is_final());
    assert_eq!(h.dsp.sent_count(), sent);

    h.dsp.notify(session.address(), Notification::BufferDone { bytes: BLOCK });
    assert!(wait_until(Duration::from_secs(1), || {
        session.counters().outstanding() < u64::from(BLOCKS)
    }));
    must(h.core.drain(&session));
    assert_eq!(session.counters().outstanding(), u64::from(BLOCKS));
    assert!(h.dsp.sent_requests().contains(&Request::Drain { final_len: 100 }));
}

#[test]
fn next_track_times_out_without_last_block() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.core.drain(&session));

    let started = Instant::now();
    let err = must_err(h.core.next_track(&session));
    assert!(matches!(
        err.as_stream(),
        Some(StreamError::Timeout { op: "next_track", .. })
    ));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(!h.dsp.sent_functions().contains(&Function::NextTrack));
}

#[test]
fn drain_is_offload_only() {
    let h = Harness::new();
    let session = h.running(NORMAL_PLAY);

    assert!(matches!(
        h.core.drain(&session),
        Err(AdspError::Validation(ValidationError::UnsupportedByScene {
            op: "drain",
            ..
        }))
    ));
}

#[test]
fn operations_after_free_report_not_found() {
    let h = Harness::new();
    let session = must(h.core.alloc(OFFLOAD));
    must(h.core.free(&session));

    assert!(matches!(
        h.core.startup(&session, stream_config(pcm())),
        Err(AdspError::Stream(StreamError::NotFound(0x0901)))
    ));
    assert!(h.core.get(OFFLOAD).is_none());
}

#[test]
fn free_refuses_active_session() {
    let h = Harness::new();
    let session = h.prepared(OFFLOAD);

    assert!(matches!(
        h.core.free(&session),
        Err(AdspError::Stream(StreamError::NotIdle { .. }))
    ));
    must(h.core.shutdown(&session));
    must(h.core.free(&session));
    assert_eq!(h.core.live_count(), 0);
}

#[test]
fn idle_twice_matches_idle_once() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.core.write(&session, &vec![0; BLOCK as usize]));

    h.core.idle(&session);
    let once = session.snapshot();
    h.core.idle(&session);
    assert_eq!(session.snapshot(), once);
    assert_eq!(once.state, StreamState::Idle);
    assert_eq!(once.produced, 0);
    assert!(once.head.is_none());
    assert_eq!(h.core.power().live_votes(), 0);
}

#[test]
fn transition_acks_reach_the_callback() {
    let h = Harness::new();
    let session = must(h.core.alloc(OFFLOAD));
    let events = record_events(&session);

    must(h.core.startup(&session, stream_config(pcm())));
    must(h.core.start(&session));
    must(h.core.pause(&session));
    must(h.core.resume(&session));
    must(h.core.shutdown(&session));

    let ops: Vec<_> = events
        .lock()
        .iter()
        .filter_map(|e| match e {
            StreamEvent::TransitionAck { op } => Some(*op),
            _ => None,
        })
        .collect();
    assert_eq!(
        ops,
        vec![
            StreamOp::Startup,
            StreamOp::Start,
            StreamOp::Pause,
            StreamOp::Resume,
            StreamOp::Shutdown
        ]
    );
}
