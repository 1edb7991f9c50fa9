//! Property tests for the lifecycle and data paths.

mod common;

use std::time::Duration;

use adsp_core::state::ALL_OPS;
use adsp_core::{Session, StreamOp, StreamState};
use adsp_errors::StreamError;
use adsp_protocol::{Function, Notification};
use adsp_test_helpers::prelude::*;
use common::*;
use proptest::prelude::*;

fn apply(h: &Harness, session: &Session, op: StreamOp) -> adsp_errors::Result<()> {
    match op {
        StreamOp::Startup => h.core.startup(session, stream_config(pcm())),
        StreamOp::Shutdown => h.core.shutdown(session),
        StreamOp::Start => h.core.start(session),
        StreamOp::Pause => h.core.pause(session),
        StreamOp::Resume => h.core.resume(session),
        StreamOp::Flush => h.core.flush(session),
        StreamOp::Stop => h.core.stop(session),
        StreamOp::Drain => h.core.drain(session),
        StreamOp::NextTrack => h.core.next_track(session),
    }
}

fn any_op() -> impl Strategy<Value = StreamOp> {
    prop::sample::select(ALL_OPS.to_vec())
}

#[derive(Debug, Clone)]
enum RingStep {
    Write(usize),
    Drain,
    /// DSP reports this many whole blocks played
    Consume(u32),
}

fn ring_step() -> impl Strategy<Value = RingStep> {
    prop_oneof![
        3 => (0usize..3 * BLOCK as usize).prop_map(RingStep::Write),
        1 => Just(RingStep::Drain),
        1 => (1u32..=BLOCKS).prop_map(RingStep::Consume),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn session_state_follows_transition_table(ops in prop::collection::vec(any_op(), 1..16)) {
        let h = Harness::new();
        h.dsp.script(Function::Drain, Script::AckThen(vec![Notification::LastBlockConsumed]));
        let session = must(h.core.alloc(OFFLOAD));
        let mut model = StreamState::Idle;

        for op in ops {
            let sent = h.dsp.sent_count();
            let result = apply(&h, &session, op);
            match model.transition(op) {
                Ok(next) => {
                    prop_assert!(matches!(result, Ok(())), "{op} from {model} failed: {result:?}");
                    model = next;
                }
                Err(_) => {
                    let illegal = matches!(
                        result.as_ref().err().and_then(|e| e.as_stream()),
                        Some(StreamError::IllegalTransition { .. })
                    );
                    prop_assert!(illegal, "{op} from {model} returned {result:?}");
                    prop_assert_eq!(h.dsp.sent_count(), sent);
                }
            }
            prop_assert_eq!(session.state(), model);
            prop_assert_eq!(session.is_active(), model.is_active());
        }
    }

    #[test]
    fn ring_accounting_stays_bounded(sizes in prop::collection::vec(0usize..3 * BLOCK as usize, 1..24)) {
        let h = Harness::new();
        let session = h.running(OFFLOAD);

        for size in sizes {
            let data = vec![0x5Au8; size];
            if let Err(e) = h.core.write(&session, &data) {
                let full = matches!(e.as_stream(), Some(StreamError::InsufficientSpace { .. }));
                prop_assert!(full, "unexpected write failure: {e}");
            }
            let counters = session.counters();
            prop_assert!(counters.released() <= counters.produced());
            prop_assert!(counters.produced() - counters.released() <= u64::from(BLOCKS));
            prop_assert!(session.residue_len() < BLOCK as usize);
        }
    }

    #[test]
    fn ring_accounting_holds_across_drain(steps in prop::collection::vec(ring_step(), 1..24)) {
        let h = Harness::new();
        let session = h.running(OFFLOAD);

        for step in steps {
            match step {
                RingStep::Write(size) => {
                    if let Err(e) = h.core.write(&session, &vec![0x3Cu8; size]) {
                        let full = matches!(e.as_stream(), Some(StreamError::InsufficientSpace { .. }));
                        prop_assert!(full, "unexpected write failure: {e}");
                    }
                }
                RingStep::Drain => {
                    let before = session.counters();
                    let had_residue = session.residue_len() > 0;
                    let sent = h.dsp.sent_count();
                    match h.core.drain(&session) {
                        Ok(()) => {
                            prop_assert_eq!(session.residue_len(), 0);
                        }
                        Err(e) => {
                            let full = matches!(e.as_stream(), Some(StreamError::InsufficientSpace { .. }));
                            prop_assert!(full, "unexpected drain failure: {e}");
                            prop_assert!(had_residue);
                            prop_assert_eq!(before.outstanding(), u64::from(BLOCKS));
                            prop_assert_eq!(session.counters(), before);
                            prop_assert_eq!(h.dsp.sent_count(), sent);
                        }
                    }
                }
                RingStep::Consume(blocks) => {
                    let outstanding = session.counters().outstanding();
                    if outstanding > 0 {
                        let expected = outstanding.saturating_sub(u64::from(blocks));
                        h.dsp.notify(session.address(), Notification::BufferDone { bytes: blocks * BLOCK });
                        let drained = wait_until(Duration::from_secs(1), || {
                            session.counters().outstanding() == expected
                        });
                        prop_assert!(drained);
                    }
                }
            }
            let counters = session.counters();
            prop_assert_eq!(session.state(), StreamState::Running);
            prop_assert!(counters.released() <= counters.produced());
            prop_assert!(counters.outstanding() <= u64::from(BLOCKS));
            prop_assert!(session.residue_len() < BLOCK as usize);
        }
    }
}
