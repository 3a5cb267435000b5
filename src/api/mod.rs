//! API layer for the completions endpoint: transport, frame decoding, request shaping

mod client;
mod completions;
mod request;
mod response;
mod sse;

pub use client::{AbortHandle, HttpTransport, StreamRequest, Transport, TransportEvent};
pub use completions::{CallOutcome, CompletionsService, CONVERSE_MAX_CHAR_LENGTH};
pub use request::{
    ChatMessage, IdentityInterceptor, RequestDetails, RequestInterceptor, RequestSettings, Role,
    DEMO_URL,
};
pub use response::{Choice, ChoiceDelta, FrameError, ResponseFrame};
pub use sse::{
    decode_frame, extractor_for, ChatExtractor, CompletionsExtractor, DecodeError, DecodedFrame,
    ExtractorKind, ResultExtractor, DONE_SENTINEL,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stream error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Message suitable for showing to the end user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Http(e) if e.is_connect() => {
                "Could not connect to the completions service".to_string()
            }
            ApiError::Http(e) if e.is_timeout() => "The completions service timed out".to_string(),
            ApiError::Http(_) => "Request to the completions service failed".to_string(),
            ApiError::InvalidRequest(msg) => msg.clone(),
            ApiError::Transport(_) => "The response stream was interrupted".to_string(),
            ApiError::Serialization(_) => "The service returned an unreadable response".to_string(),
        }
    }
}
