//! Data path integration tests: block submission, capture reads and the
//! low-latency pipeline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use adsp_core::{HeapRegion, RegionMemory, StreamConfig, StreamState};
use adsp_errors::{AdspError, StreamError, ValidationError};
use adsp_power::PowerController;
use adsp_protocol::{Function, Notification, RegionDescriptor, Request, RouteId};
use adsp_test_helpers::prelude::*;
use common::*;

#[test]
fn write_before_startup_is_not_attached() {
    let h = Harness::new();
    let session = must(h.core.alloc(OFFLOAD));

    assert!(matches!(
        h.core.write(&session, &[0; 16]),
        Err(AdspError::Stream(StreamError::NotAttached(0x0901)))
    ));
    assert_eq!(h.dsp.sent_count(), 0);
}

#[test]
fn write_after_shutdown_fails_locally() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.core.shutdown(&session));
    let sent = h.dsp.sent_count();

    assert!(matches!(
        h.core.write(&session, &[0; 16]),
        Err(AdspError::Stream(StreamError::NotAttached(_)))
    ));
    assert_eq!(h.dsp.sent_count(), sent);
}

#[test]
fn write_is_playback_only() {
    let h = Harness::new();
    let session = h.running(NORMAL_CAPTURE);

    assert!(matches!(
        h.core.write(&session, &[0; 16]),
        Err(AdspError::Validation(ValidationError::UnsupportedByScene { op: "write", .. }))
    ));
    let mut out = [0u8; 16];
    let playback = h.running(OFFLOAD);
    assert!(matches!(
        h.core.read(&playback, &mut out),
        Err(AdspError::Validation(ValidationError::UnsupportedByScene { op: "read", .. }))
    ));
}

#[test]
fn partial_blocks_wait_as_residue() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);

    must(h.core.write(&session, &vec![1; 700]));
    assert_eq!(session.counters().produced(), 0);
    assert_eq!(session.residue_len(), 700);
    assert!(!h.dsp.sent_functions().contains(&Function::DataNotify));

    must(h.core.write(&session, &vec![2; 700]));
    assert_eq!(session.counters().produced(), 1);
    assert_eq!(session.residue_len(), 1400 - BLOCK as usize);
    assert_eq!(session.total_bytes(), 1400);
    assert!(h.dsp.sent_requests().contains(&Request::DataNotify {
        write_cursor: BLOCK,
        bytes: BLOCK
    }));
}

#[test]
fn full_ring_rejects_whole_write() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);

    must(h.core.write(&session, &vec![0; (BLOCK * BLOCKS) as usize]));
    assert_eq!(session.counters().outstanding(), u64::from(BLOCKS));

    let err = must_err(h.core.write(&session, &vec![0; BLOCK as usize]));
    assert!(matches!(
        err.as_stream(),
        Some(StreamError::InsufficientSpace { free: 0, .. })
    ));
    assert_eq!(session.counters().produced(), u64::from(BLOCKS));
    assert_eq!(session.residue_len(), 0);

    // Less than a block still fits as residue.
    must(h.core.write(&session, &[0; 10]));
    assert_eq!(session.residue_len(), 10);
}

#[test]
fn buffer_done_frees_room() {
    let h = Harness::new();
    h.dsp.consume_data(true);
    let session = h.running(OFFLOAD);
    let events = record_events(&session);

    for _ in 0..3 {
        must(h.core.write(&session, &vec![0; (BLOCK * BLOCKS) as usize]));
        assert!(wait_until(Duration::from_secs(1), || {
            session.counters().outstanding() == 0
        }));
    }
    assert_eq!(session.counters().produced(), u64::from(BLOCKS) * 3);
    assert_eq!(buffer_done_bytes(&events), vec![BLOCK * BLOCKS; 3]);
}

#[test]
fn write_powers_dsp_back_on() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.power.power_off());
    let on_before = h.power.on_count();

    must(h.core.write(&session, &vec![0; BLOCK as usize]));
    assert_eq!(h.power.on_count(), on_before + 1);
    assert!(h.power.is_powered());
}

#[test]
fn write_surfaces_power_failure_with_context() {
    let h = Harness::new();
    let session = h.running(OFFLOAD);
    must(h.power.power_off());
    h.power.fail_power_on(true);

    let err = must_err(h.core.write(&session, &[0; 4]));
    assert!(matches!(err.root(), AdspError::Power(_)));
    assert!(err.to_string().starts_with("write, session_id=0x0901"));
}

fn started_capture(h: &Harness, memory: Arc<HeapRegion>) -> adsp_core::Session {
    let session = must(h.core.alloc(NORMAL_CAPTURE));
    let config = StreamConfig::new(
        pcm(),
        RouteId(1),
        RegionDescriptor {
            base: 0x9000_0000,
            block_size: BLOCK,
            block_count: BLOCKS,
        },
        memory,
    );
    must(h.core.startup(&session, config));
    must(h.core.start(&session));
    session
}

#[test]
fn capture_read_releases_fully_read_blocks() {
    let h = Harness::new();
    let memory = Arc::new(HeapRegion::new((BLOCK * BLOCKS) as usize));
    let pattern: Vec<u8> = (0..1500u32).map(|i| (i % 251) as u8).collect();
    memory.write(0, &pattern);
    let session = started_capture(&h, memory);

    h.dsp.notify(session.address(), Notification::BufferDone { bytes: 1500 });
    assert!(wait_until(Duration::from_secs(1), || session.readable_bytes() == 1500));
    assert_eq!(session.counters().produced(), 2);

    let mut first = vec![0u8; BLOCK as usize];
    assert_eq!(must(h.core.read(&session, &mut first)), BLOCK as usize);
    assert_eq!(first.as_slice(), pattern.get(..BLOCK as usize).unwrap_or_default());
    assert_eq!(session.counters().released(), 1);
    assert!(h.dsp.sent_requests().contains(&Request::DataNotify {
        write_cursor: BLOCK,
        bytes: BLOCK
    }));

    let mut rest = vec![0u8; 4096];
    assert_eq!(must(h.core.read(&session, &mut rest)), 1500 - BLOCK as usize);
    assert_eq!(session.counters().released(), 2);
    assert_eq!(session.counters().outstanding(), 0);
    assert_eq!(
        must_some(session.region_head(), "region configured").read_cursor,
        BLOCK * 2
    );
    assert_eq!(must(h.core.read(&session, &mut rest)), 0);
}

#[test]
fn short_capture_blocks_stay_within_the_ring() {
    let h = Harness::new();
    let memory = Arc::new(HeapRegion::new((BLOCK * BLOCKS) as usize));
    for slot in 0..BLOCKS {
        memory.write((slot * BLOCK) as usize, &[slot as u8 + 1; 300]);
    }
    let session = started_capture(&h, memory);
    let events = record_events(&session);

    for _ in 0..BLOCKS + 2 {
        h.dsp.notify(session.address(), Notification::BufferDone { bytes: 300 });
    }
    assert!(wait_until(Duration::from_secs(1), || {
        buffer_done_bytes(&events).len() == BLOCKS as usize
    }));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(session.counters().produced(), u64::from(BLOCKS));
    assert_eq!(session.readable_bytes(), u64::from(300 * BLOCKS));
    assert_eq!(buffer_done_bytes(&events).len(), BLOCKS as usize);

    let mut out = vec![0u8; (300 * BLOCKS) as usize];
    assert_eq!(must(h.core.read(&session, &mut out)), out.len());
    let expected: Vec<u8> = (1..=BLOCKS as u8).flat_map(|b| [b; 300]).collect();
    assert_eq!(out, expected);
    assert_eq!(session.counters().released(), u64::from(BLOCKS));
    assert_eq!(session.counters().outstanding(), 0);

    h.dsp.notify(session.address(), Notification::BufferDone { bytes: 300 });
    assert!(wait_until(Duration::from_secs(1), || session.readable_bytes() == 300));
    let mut again = vec![0u8; 300];
    assert_eq!(must(h.core.read(&session, &mut again)), 300);
    assert_eq!(again, vec![1u8; 300]);
}

#[test]
fn mmap_playback_runs_through_pipeline() {
    let h = Harness::new();
    let session = h.prepared(MMAP_PLAY);
    let events = record_events(&session);
    assert!(session.has_pipeline());

    must(h.core.start(&session));
    must(h.core.write(&session, &vec![7; (BLOCK * 2) as usize]));
    assert!(wait_until(Duration::from_secs(1), || {
        session.counters().released() == 2
    }));

    let submitted = h.transport.submitted();
    assert_eq!(submitted.len(), 3);
    assert!(submitted.first().is_some_and(|b| b.is_marker()));
    assert_eq!(buffer_done_bytes(&events), vec![BLOCK, BLOCK]);
    assert!(!h.dsp.sent_functions().contains(&Function::DataNotify));

    must(h.core.shutdown(&session));
    assert!(!session.has_pipeline());
    assert_eq!(session.state(), StreamState::Idle);
}

#[test]
fn paused_pipeline_holds_blocks() {
    let h = Harness::new();
    let session = h.running(MMAP_PLAY);
    assert!(wait_until(Duration::from_secs(1), || h.transport.submitted().len() == 1));
    must(h.core.pause(&session));

    must(h.core.write(&session, &vec![0; BLOCK as usize]));
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(h.transport.submitted().len(), 1);

    must(h.core.resume(&session));
    assert!(wait_until(Duration::from_secs(1), || h.transport.submitted().len() == 2));
}

#[test]
fn mmap_capture_recycles_read_blocks() {
    let h = Harness::new();
    h.transport.set_fill_result(BLOCK as isize);
    let session = h.running(MMAP_CAPTURE);

    assert!(wait_until(Duration::from_secs(1), || {
        session.counters().produced() == u64::from(BLOCKS)
    }));
    assert_eq!(session.readable_bytes(), u64::from(BLOCK * BLOCKS));

    let mut out = vec![0u8; (BLOCK * 2) as usize];
    assert_eq!(must(h.core.read(&session, &mut out)), out.len());
    assert_eq!(session.counters().released(), 2);
    assert!(wait_until(Duration::from_secs(1), || {
        session.counters().produced() == u64::from(BLOCKS) + 2
    }));
    assert!(session.counters().released() <= session.counters().produced());
}

#[test]
fn ultra_fast_scene_without_transport_is_rejected() {
    init_test_tracing();
    let dsp = ScriptedDsp::new();
    let core = must(
        adsp_core::AudioCore::builder()
            .config(fast_config())
            .channel(dsp.clone())
            .power(Arc::new(MockPowerController::new()))
            .repair(Arc::new(ImmediateRepair::new()))
            .build(),
    );
    dsp.connect(core.frame_sink());
    let session = must(core.alloc(MMAP_PLAY));

    assert!(matches!(
        core.startup(&session, stream_config(pcm())),
        Err(AdspError::Validation(ValidationError::Required(field))) if field == "block_transport"
    ));
    assert_eq!(dsp.sent_count(), 0);
}
