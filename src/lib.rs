//! stream-chat - streaming chat replies from a completions endpoint
//!
//! A reply arrives as a series of server-sent events. Each frame is decoded,
//! its text extracted and appended to a single message in the UI, which is
//! sealed exactly once when the stream closes, fails or is cancelled.
//!
//! ## Layout
//!
//! - **api**: request settings, the HTTP/SSE transport, frame decoding and the
//!   completions service that ties them together
//! - **stream**: the stream session state machine, its controller and the
//!   simulated stream used for demos
//! - **config**: TOML configuration with environment overrides
//! - **tui**: interactive terminal chat

pub mod api;
pub mod config;
pub mod stream;
pub mod tui;

pub use api::{
    AbortHandle, ApiError, CallOutcome, ChatMessage, CompletionsService, HttpTransport,
    RequestSettings, Transport, TransportEvent,
};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use stream::{
    FailureDisplay, LifecycleHandlers, MessageSink, SimulatedStream, StreamController,
    StreamError, StreamOutcome,
};
