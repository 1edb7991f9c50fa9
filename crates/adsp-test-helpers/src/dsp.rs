//! A scripted DSP on the other end of the message channel.
//!
//! Every frame the core sends is recorded. Requests are answered according
//! to a per-function [`Script`] (acknowledge by default) and the answers are
//! delivered to the connected [`FrameSink`] from a dedicated delivery
//! thread, the way a real transport would call back from its own context.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use adsp_protocol::{
    Address, ChannelError, Frame, FrameSink, Function, Message, MessageChannel, Notification,
    Reply, ReplyBody, Request, StreamTimestamp,
};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;

use crate::must::must;

/// How the DSP answers one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Success reply with the default body for the function
    Ack,
    /// Reply with this non-zero result code
    Fail(u8),
    /// Never answer
    Silent,
    /// Success reply with an explicit body
    AckWith(ReplyBody),
    /// Success reply, then these notifications in order
    AckThen(Vec<Notification>),
    /// Answer after a delay
    Delayed(Duration, Box<Script>),
}

enum Delivery {
    Frame([u8; adsp_protocol::FRAME_SIZE]),
    After(Duration, Vec<[u8; adsp_protocol::FRAME_SIZE]>),
}

pub struct ScriptedDsp {
    sent: Mutex<Vec<Frame>>,
    scripts: Mutex<HashMap<Function, Script>>,
    params: Mutex<HashMap<u32, Vec<u8>>>,
    sink: Arc<Mutex<Option<FrameSink>>>,
    tx: Mutex<Option<Sender<Delivery>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    refuse_sends: AtomicBool,
    consume_data: AtomicBool,
    rtc_us: Mutex<u64>,
    timestamp: Mutex<StreamTimestamp>,
}

impl ScriptedDsp {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = channel::unbounded::<Delivery>();
        let sink: Arc<Mutex<Option<FrameSink>>> = Arc::new(Mutex::new(None));
        let thread_sink = Arc::clone(&sink);
        let worker = must(thread::Builder::new()
            .name("scripted-dsp".into())
            .spawn(move || {
                for delivery in rx {
                    let frames = match delivery {
                        Delivery::Frame(bytes) => vec![bytes],
                        Delivery::After(delay, frames) => {
                            thread::sleep(delay);
                            frames
                        }
                    };
                    let current = thread_sink.lock().clone();
                    if let Some(sink) = current {
                        for bytes in frames {
                            sink(&bytes);
                        }
                    }
                }
            }));
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            scripts: Mutex::new(HashMap::new()),
            params: Mutex::new(HashMap::new()),
            sink,
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            refuse_sends: AtomicBool::new(false),
            consume_data: AtomicBool::new(false),
            rtc_us: Mutex::new(1_000_000),
            timestamp: Mutex::new(StreamTimestamp::default()),
        })
    }

    /// Route DSP-originated frames into `sink`.
    pub fn connect(&self, sink: FrameSink) {
        *self.sink.lock() = Some(sink);
    }

    pub fn script(&self, function: Function, script: Script) {
        self.scripts.lock().insert(function, script);
    }

    pub fn clear_scripts(&self) {
        self.scripts.lock().clear();
    }

    /// Make `send` fail with [`ChannelError::Closed`].
    pub fn refuse_sends(&self, refuse: bool) {
        self.refuse_sends.store(refuse, Ordering::SeqCst);
    }

    /// Answer every `DataNotify { bytes }` with `BufferDone { bytes }`.
    pub fn consume_data(&self, enabled: bool) {
        self.consume_data.store(enabled, Ordering::SeqCst);
    }

    pub fn set_rtc(&self, rtc_us: u64) {
        *self.rtc_us.lock() = rtc_us;
    }

    pub fn set_timestamp(&self, ts: StreamTimestamp) {
        *self.timestamp.lock() = ts;
    }

    /// Push an unsolicited notification.
    pub fn notify(&self, address: Address, note: Notification) {
        if let Ok(frame) = Message::Notification(note).encode(address) {
            self.deliver(Delivery::Frame(frame.to_bytes()));
        }
    }

    /// Report a firmware fault.
    pub fn fault(&self, reason: u32) {
        self.notify(Address::GLOBAL, Notification::FaultReport { reason });
    }

    /// Push raw bytes, for malformed-frame tests.
    pub fn inject_raw(&self, bytes: [u8; adsp_protocol::FRAME_SIZE]) {
        self.deliver(Delivery::Frame(bytes));
    }

    pub fn sent_frames(&self) -> Vec<Frame> {
        self.sent.lock().clone()
    }

    pub fn sent_functions(&self) -> Vec<Function> {
        self.sent
            .lock()
            .iter()
            .filter_map(|f| f.function().ok())
            .collect()
    }

    pub fn sent_requests(&self) -> Vec<Request> {
        self.sent
            .lock()
            .iter()
            .filter_map(|f| match Message::decode(f) {
                Ok(Message::Request(req)) => Some(req),
                _ => None,
            })
            .collect()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn clear_sent(&self) {
        self.sent.lock().clear();
    }

    /// Stop the delivery thread. Further answers are dropped.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("scripted dsp delivery thread panicked");
            }
        }
    }

    fn deliver(&self, delivery: Delivery) {
        match self.tx.lock().as_ref() {
            Some(tx) => {
                if tx.send(delivery).is_err() {
                    tracing::warn!("scripted dsp delivery thread gone, frame dropped");
                }
            }
            None => tracing::debug!("scripted dsp shut down, frame dropped"),
        }
    }

    fn default_body(&self, req: &Request) -> ReplyBody {
        match req {
            Request::GetRtc => ReplyBody::Rtc {
                rtc_us: *self.rtc_us.lock(),
            },
            Request::GetTimestamp => ReplyBody::Timestamp(*self.timestamp.lock()),
            Request::GetParam { param_id } => {
                ReplyBody::Param(self.params.lock().get(param_id).cloned().unwrap_or_default())
            }
            _ => ReplyBody::Empty,
        }
    }

    fn answer(&self, req: &Request, script: &Script) -> Vec<Message> {
        let function = req.function();
        match script {
            Script::Ack => vec![Message::Reply(Reply {
                function,
                result_code: 0,
                body: self.default_body(req),
            })],
            Script::Fail(code) => vec![Message::Reply(Reply::failure(function, *code))],
            Script::Silent => Vec::new(),
            Script::AckWith(body) => vec![Message::Reply(Reply {
                function,
                result_code: 0,
                body: body.clone(),
            })],
            Script::AckThen(notes) => {
                let mut out = self.answer(req, &Script::Ack);
                out.extend(notes.iter().copied().map(Message::Notification));
                out
            }
            Script::Delayed(_, inner) => self.answer(req, inner),
        }
    }
}

impl MessageChannel for ScriptedDsp {
    fn send(&self, frame: &Frame) -> Result<(), ChannelError> {
        if self.refuse_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }
        self.sent.lock().push(frame.clone());

        let Ok(Message::Request(req)) = Message::decode(frame) else {
            return Ok(());
        };
        let address = frame.address();
        tracing::trace!(function = %req.function(), ?address, "scripted dsp received request");

        if let Request::SetParam { param_id, data } = &req {
            self.params.lock().insert(*param_id, data.clone());
        }
        if let Request::DataNotify { bytes, .. } = req {
            if self.consume_data.load(Ordering::SeqCst) {
                self.notify(address, Notification::BufferDone { bytes });
            }
            return Ok(());
        }

        let script = self
            .scripts
            .lock()
            .get(&req.function())
            .cloned()
            .unwrap_or(Script::Ack);
        let frames: Vec<_> = self
            .answer(&req, &script)
            .iter()
            .filter_map(|m| m.encode(address).ok())
            .map(|f| f.to_bytes())
            .collect();
        if frames.is_empty() {
            return Ok(());
        }
        match script {
            Script::Delayed(delay, _) => self.deliver(Delivery::After(delay, frames)),
            _ => {
                for bytes in frames {
                    self.deliver(Delivery::Frame(bytes));
                }
            }
        }
        Ok(())
    }
}

impl Drop for ScriptedDsp {
    fn drop(&mut self) {
        self.tx.lock().take();
    }
}
