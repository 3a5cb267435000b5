//! Lifecycle state of a single stream session

use super::sink::{LifecycleHandlers, MessageSink};
use super::StreamError;
use std::fmt;
use tracing::debug;

/// Session states. The sink handle only exists while the session is open,
/// so appending outside `Open`/`Streaming` is unrepresentable.
#[derive(Debug)]
pub enum StreamState<H> {
    Idle,
    Connecting,
    Open(H),
    Streaming(H),
    Closing,
    Closed,
    Error,
}

/// Handle-free view of [`StreamState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Connecting,
    Open,
    Streaming,
    Closing,
    Closed,
    Error,
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StreamPhase::Idle => "idle",
            StreamPhase::Connecting => "connecting",
            StreamPhase::Open => "open",
            StreamPhase::Streaming => "streaming",
            StreamPhase::Closing => "closing",
            StreamPhase::Closed => "closed",
            StreamPhase::Error => "error",
        };
        f.write_str(name)
    }
}

impl<H> StreamState<H> {
    pub fn phase(&self) -> StreamPhase {
        match self {
            StreamState::Idle => StreamPhase::Idle,
            StreamState::Connecting => StreamPhase::Connecting,
            StreamState::Open(_) => StreamPhase::Open,
            StreamState::Streaming(_) => StreamPhase::Streaming,
            StreamState::Closing => StreamPhase::Closing,
            StreamState::Closed => StreamPhase::Closed,
            StreamState::Error => StreamPhase::Error,
        }
    }
}

impl StreamPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamPhase::Closed | StreamPhase::Error)
    }
}

/// Owns the sink target of one session and guarantees that it is created at
/// most once and sealed exactly once, with `on_close` fired alongside.
pub struct StreamSession<'a, S: MessageSink, L: LifecycleHandlers> {
    state: StreamState<S::Handle>,
    sink: &'a mut S,
    handlers: &'a mut L,
}

impl<'a, S: MessageSink, L: LifecycleHandlers> StreamSession<'a, S, L> {
    pub fn new(sink: &'a mut S, handlers: &'a mut L) -> Self {
        Self {
            state: StreamState::Idle,
            sink,
            handlers,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.state.phase()
    }

    pub fn sink(&mut self) -> &mut S {
        &mut *self.sink
    }

    fn enter(&mut self, next: StreamState<S::Handle>) {
        debug!(from = %self.state.phase(), to = %next.phase(), "Stream transition");
        self.state = next;
    }

    fn invalid(&self, input: &'static str) -> StreamError {
        StreamError::InvalidTransition {
            from: self.state.phase(),
            input,
        }
    }

    /// Idle → Connecting
    pub fn begin(&mut self) -> Result<(), StreamError> {
        match self.state {
            StreamState::Idle => {
                self.enter(StreamState::Connecting);
                Ok(())
            }
            _ => Err(self.invalid("begin")),
        }
    }

    /// Connecting → Open: creates the sink target and fires `on_open`
    pub fn open(&mut self) -> Result<(), StreamError> {
        if !matches!(self.state, StreamState::Connecting) {
            return Err(self.invalid("open"));
        }
        let handle = self.sink.create();
        self.enter(StreamState::Open(handle));
        self.handlers.on_open();
        Ok(())
    }

    /// Open/Streaming → Streaming: appends one delta
    pub fn push(&mut self, text: &str) -> Result<(), StreamError> {
        match std::mem::replace(&mut self.state, StreamState::Closing) {
            StreamState::Open(mut handle) | StreamState::Streaming(mut handle) => {
                self.sink.append(&mut handle, text);
                self.state = StreamState::Streaming(handle);
                Ok(())
            }
            other => {
                self.state = other;
                Err(self.invalid("push"))
            }
        }
    }

    /// Graceful end: seals the target (creating an empty one if the stream
    /// never opened) and fires `on_close`
    pub fn close(&mut self) -> Result<(), StreamError> {
        if !self.is_active() {
            return Err(self.invalid("close"));
        }
        self.seal(true, StreamState::Closed);
        Ok(())
    }

    /// Caller abort: same guarantees as [`close`](Self::close), from any
    /// non-terminal state
    pub fn cancel(&mut self) -> Result<(), StreamError> {
        if self.phase().is_terminal() || matches!(self.state, StreamState::Closing) {
            return Err(self.invalid("cancel"));
        }
        self.seal(true, StreamState::Closed);
        Ok(())
    }

    /// Connection refused at open: no target is created and no callback fires
    pub fn reject(&mut self) -> Result<(), StreamError> {
        match self.state {
            StreamState::Connecting => {
                self.enter(StreamState::Error);
                Ok(())
            }
            _ => Err(self.invalid("reject")),
        }
    }

    /// Hard failure: seals an existing target, fires `on_close`, ends in Error
    pub fn fail(&mut self) -> Result<(), StreamError> {
        if !self.is_active() {
            return Err(self.invalid("fail"));
        }
        self.seal(false, StreamState::Error);
        Ok(())
    }

    /// Connecting, Open or Streaming
    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            StreamState::Connecting | StreamState::Open(_) | StreamState::Streaming(_)
        )
    }

    fn seal(&mut self, seal_empty: bool, terminal: StreamState<S::Handle>) {
        let handle = match std::mem::replace(&mut self.state, StreamState::Closing) {
            StreamState::Open(handle) | StreamState::Streaming(handle) => Some(handle),
            _ if seal_empty => Some(self.sink.create()),
            _ => None,
        };
        if let Some(handle) = handle {
            self.sink.finalize(handle);
        }
        self.handlers.on_close();
        self.enter(terminal);
    }
}
