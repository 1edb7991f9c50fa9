//! Shared fixtures for the core integration tests.

use std::sync::Arc;
use std::time::Duration;

use adsp_core::{AudioCore, CoreConfig, HeapRegion, Session, StreamConfig, StreamEvent};
use adsp_protocol::{RegionDescriptor, RouteId, SampleFormat, SessionId};
use adsp_test_helpers::prelude::*;
use parking_lot::Mutex;

/// Offload playback, selector 1.
pub const OFFLOAD: SessionId = SessionId::from_raw(0x0901);
pub const NORMAL_PLAY: SessionId = SessionId::from_raw(0x0000);
pub const NORMAL_CAPTURE: SessionId = SessionId::from_raw(0x0100);
pub const MMAP_PLAY: SessionId = SessionId::from_raw(0x0300);
pub const MMAP_CAPTURE: SessionId = SessionId::from_raw(0x0400);
pub const VOICE_CALL_PLAY: SessionId = SessionId::from_raw(0x0700);
pub const KWS: SessionId = SessionId::from_raw(0x0B00);
pub const FM_DUPLEX: SessionId = SessionId::from_raw(0x0F00);

pub const BLOCK: u32 = 1024;
pub const BLOCKS: u32 = 4;

/// Short bounds so timeout paths finish quickly.
pub fn fast_config() -> CoreConfig {
    must(
        CoreConfig::builder()
            .op_timeout(Duration::from_millis(200))
            .drain_timeout(Duration::from_millis(300))
            .repair_timeout(Duration::from_secs(1))
            .build(),
    )
}

pub fn pcm() -> SampleFormat {
    SampleFormat::pcm(48_000, 2, 16)
}

pub fn stream_config(format: SampleFormat) -> StreamConfig {
    let region = RegionDescriptor {
        base: 0x8000_0000,
        block_size: BLOCK,
        block_count: BLOCKS,
    };
    StreamConfig::new(
        format,
        RouteId(1),
        region,
        Arc::new(HeapRegion::new((BLOCK * BLOCKS) as usize)),
    )
}

pub struct Harness {
    pub core: AudioCore,
    pub dsp: Arc<ScriptedDsp>,
    pub power: Arc<MockPowerController>,
    pub repair: Arc<ImmediateRepair>,
    pub transport: Arc<MockTransport>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        init_test_tracing();
        let dsp = ScriptedDsp::new();
        let power = Arc::new(MockPowerController::new());
        let repair = Arc::new(ImmediateRepair::new());
        let transport = Arc::new(MockTransport::new(8));
        let core = must(
            AudioCore::builder()
                .config(config)
                .channel(dsp.clone())
                .power(power.clone())
                .repair(repair.clone())
                .block_transport(transport.clone())
                .build(),
        );
        dsp.connect(core.frame_sink());
        Self {
            core,
            dsp,
            power,
            repair,
            transport,
        }
    }

    /// Allocate `id` and bring it to Prepared with the default PCM format.
    pub fn prepared(&self, id: SessionId) -> Session {
        let session = must(self.core.alloc(id));
        must(self.core.startup(&session, stream_config(pcm())));
        session
    }

    pub fn running(&self, id: SessionId) -> Session {
        let session = self.prepared(id);
        must(self.core.start(&session));
        session
    }
}

/// Collect every event the session reports.
pub fn record_events(session: &Session) -> Arc<Mutex<Vec<StreamEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    session.set_callback(move |_, event| sink.lock().push(*event));
    events
}

pub fn buffer_done_bytes(events: &Mutex<Vec<StreamEvent>>) -> Vec<u32> {
    events
        .lock()
        .iter()
        .filter_map(|e| match e {
            StreamEvent::BufferDone { bytes } => Some(*bytes),
            _ => None,
        })
        .collect()
}
