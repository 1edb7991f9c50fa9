//! The single outstanding request of a session.
//!
//! Every request owns a one-shot reply channel. The dispatch path completes
//! it with the DSP's reply; a fault aborts it; a timeout disarms it by
//! token so a late reply for an abandoned request is dropped.

use std::time::Instant;

use adsp_protocol::{Function, Reply};
use crossbeam::channel::{self, Receiver, Sender};

/// Session id reported in errors for requests not tied to a session.
pub(crate) const GLOBAL_SESSION: u16 = 0xFFFF;

#[derive(Debug)]
pub(crate) enum Completion {
    Replied(Reply),
    Aborted,
}

#[derive(Debug)]
pub(crate) struct PendingOperation {
    token: u64,
    function: Function,
    issued_at: Instant,
    tx: Sender<Completion>,
}

impl PendingOperation {
    pub(crate) fn new(token: u64, function: Function) -> (Self, Receiver<Completion>) {
        let (tx, rx) = channel::bounded(1);
        let op = Self {
            token,
            function,
            issued_at: Instant::now(),
            tx,
        };
        (op, rx)
    }

    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    pub(crate) fn function(&self) -> Function {
        self.function
    }

    pub(crate) fn op(&self) -> &'static str {
        self.function.as_str()
    }

    /// Whether `reply` answers this request.
    pub(crate) fn matches(&self, reply: &Reply) -> bool {
        reply.function == self.function
    }

    pub(crate) fn complete(self, reply: Reply) {
        tracing::trace!(
            op = self.op(),
            result_code = reply.result_code,
            elapsed_us = u64::try_from(self.issued_at.elapsed().as_micros()).unwrap_or(u64::MAX),
            "request completed"
        );
        if self.tx.try_send(Completion::Replied(reply)).is_err() {
            tracing::debug!(op = self.op(), "reply arrived after the waiter left");
        }
    }

    pub(crate) fn abort(self) {
        if self.tx.try_send(Completion::Aborted).is_err() {
            tracing::trace!(op = self.op(), "abort after the waiter left");
        }
    }
}

/// Slot holding at most one [`PendingOperation`].
#[derive(Debug, Default)]
pub(crate) struct PendingSlot {
    current: Option<PendingOperation>,
}

impl PendingSlot {
    /// Arm the slot. Returns the name of the operation already in flight if
    /// it is occupied.
    pub(crate) fn arm(
        &mut self,
        token: u64,
        function: Function,
    ) -> Result<Receiver<Completion>, &'static str> {
        if let Some(current) = &self.current {
            return Err(current.op());
        }
        let (op, rx) = PendingOperation::new(token, function);
        self.current = Some(op);
        Ok(rx)
    }

    /// Clear the slot if it still holds `token`.
    pub(crate) fn disarm(&mut self, token: u64) -> bool {
        if self.current.as_ref().is_some_and(|op| op.token() == token) {
            self.current = None;
            return true;
        }
        false
    }

    /// Take the operation `reply` answers, if any.
    pub(crate) fn take_matching(&mut self, reply: &Reply) -> Option<PendingOperation> {
        if self.current.as_ref().is_some_and(|op| op.matches(reply)) {
            return self.current.take();
        }
        None
    }

    pub(crate) fn take(&mut self) -> Option<PendingOperation> {
        self.current.take()
    }

    pub(crate) fn in_flight(&self) -> Option<&'static str> {
        self.current.as_ref().map(PendingOperation::op)
    }

    pub(crate) fn in_flight_function(&self) -> Option<Function> {
        self.current.as_ref().map(PendingOperation::function)
    }
}
