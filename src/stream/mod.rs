//! Streaming response pipeline
//!
//! A [`StreamController`] turns transport events into sink updates and
//! lifecycle callbacks; [`SimulatedStream`] produces the same lifecycle from a
//! timer for demo and offline use.

mod controller;
mod session;
mod simulate;
mod sink;

pub use controller::{complete, request, Flow, StreamController, StreamInput};
pub use session::{StreamPhase, StreamSession, StreamState};
pub use simulate::SimulatedStream;
pub use sink::{BufferSink, FailureDisplay, LifecycleHandlers, MessageSink};

use crate::api::{ApiError, DecodeError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Connection rejected ({status}): {message}")]
    Open { status: u16, message: String },

    #[error(transparent)]
    Transport(#[from] ApiError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Response contained no text")]
    EmptyResponse,

    #[error("Invalid stream transition from {from} on {input}")]
    InvalidTransition {
        from: StreamPhase,
        input: &'static str,
    },
}

/// How a session that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Cancelled,
}
