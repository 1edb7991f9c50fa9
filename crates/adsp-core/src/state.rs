//! Stream lifecycle states and the transition table.
//!
//! | State | Legal ops |
//! |---|---|
//! | Idle | startup |
//! | Prepared | shutdown, start, pause, flush, stop |
//! | Paused | shutdown, start, flush, resume, stop, drain, next-track |
//! | Running | shutdown, pause, flush, stop, drain, next-track |

use std::fmt;

use adsp_errors::StreamError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StreamState {
    #[default]
    Idle,
    Prepared,
    Paused,
    Running,
}

/// Lifecycle operations subject to the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamOp {
    Startup,
    Shutdown,
    Start,
    Pause,
    Resume,
    Flush,
    Stop,
    Drain,
    NextTrack,
}

pub const ALL_STATES: [StreamState; 4] = [
    StreamState::Idle,
    StreamState::Prepared,
    StreamState::Paused,
    StreamState::Running,
];

pub const ALL_OPS: [StreamOp; 9] = [
    StreamOp::Startup,
    StreamOp::Shutdown,
    StreamOp::Start,
    StreamOp::Pause,
    StreamOp::Resume,
    StreamOp::Flush,
    StreamOp::Stop,
    StreamOp::Drain,
    StreamOp::NextTrack,
];

impl StreamOp {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamOp::Startup => "startup",
            StreamOp::Shutdown => "shutdown",
            StreamOp::Start => "start",
            StreamOp::Pause => "pause",
            StreamOp::Resume => "resume",
            StreamOp::Flush => "flush",
            StreamOp::Stop => "stop",
            StreamOp::Drain => "drain",
            StreamOp::NextTrack => "next_track",
        }
    }
}

impl fmt::Display for StreamOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamState {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamState::Idle => "Idle",
            StreamState::Prepared => "Prepared",
            StreamState::Paused => "Paused",
            StreamState::Running => "Running",
        }
    }

    /// State reached by applying `op`, or the illegal-transition error.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::IllegalTransition`] if `op` is not in this
    /// state's row of the table.
    pub fn transition(self, op: StreamOp) -> Result<StreamState, StreamError> {
        use StreamOp as Op;
        use StreamState as S;

        let next = match (self, op) {
            (S::Idle, Op::Startup) => S::Prepared,
            (S::Idle, _) => return Err(StreamError::illegal(op.as_str(), self.as_str())),

            (S::Prepared | S::Paused | S::Running, Op::Startup) => {
                return Err(StreamError::illegal(op.as_str(), self.as_str()));
            }
            (S::Prepared | S::Paused | S::Running, Op::Shutdown) => S::Idle,

            (S::Prepared | S::Paused, Op::Start) => S::Running,
            (S::Running, Op::Start) => {
                return Err(StreamError::illegal(op.as_str(), self.as_str()));
            }

            (S::Prepared | S::Running, Op::Pause) => S::Paused,
            (S::Paused, Op::Pause) => {
                return Err(StreamError::illegal(op.as_str(), self.as_str()));
            }

            (S::Paused, Op::Resume) => S::Running,
            (S::Prepared | S::Running, Op::Resume) => {
                return Err(StreamError::illegal(op.as_str(), self.as_str()));
            }

            (S::Prepared | S::Paused | S::Running, Op::Flush) => self,
            (S::Prepared | S::Paused | S::Running, Op::Stop) => S::Prepared,

            (S::Paused | S::Running, Op::Drain | Op::NextTrack) => self,
            (S::Prepared, Op::Drain | Op::NextTrack) => {
                return Err(StreamError::illegal(op.as_str(), self.as_str()));
            }
        };
        Ok(next)
    }

    pub fn allows(self, op: StreamOp) -> bool {
        self.transition(op).is_ok()
    }

    pub fn legal_ops(self) -> Vec<StreamOp> {
        ALL_OPS.into_iter().filter(|op| self.allows(*op)).collect()
    }

    /// Shared-region cursors are only meaningful outside Idle.
    pub fn is_active(self) -> bool {
        self != StreamState::Idle
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
