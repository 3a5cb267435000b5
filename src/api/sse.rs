//! Decoding of Server-Sent Events payloads from the completions stream
//!
//! Every event's `data` is either the `[DONE]` sentinel or a JSON result
//! envelope. Pulling the visible text out of an envelope is backend specific
//! and goes through a [`ResultExtractor`]:
//! - Completions: `{"choices":[{"text":"..."}]}`
//! - Chat: `{"choices":[{"delta":{"content":"..."}}]}`

use super::response::ResponseFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Marks the end of the stream; carries no payload
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("{message}")]
    Provider {
        kind: Option<String>,
        message: String,
    },
}

/// One interpreted SSE payload
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// The termination sentinel
    Done,
    /// A result envelope, not yet extracted
    Result(ResponseFrame),
}

/// Interpret a single event payload. Only the exact sentinel ends the stream;
/// a padded `[DONE]` is not JSON and fails as malformed.
pub fn decode_frame(data: &str) -> Result<DecodedFrame, DecodeError> {
    if data == DONE_SENTINEL {
        return Ok(DecodedFrame::Done);
    }
    let frame: ResponseFrame = serde_json::from_str(data)?;
    Ok(DecodedFrame::Result(frame))
}

/// Pulls the human-visible text out of a result envelope.
///
/// `Ok(None)` means the frame carried nothing usable; `Err` means the frame
/// reported an error that should be shown to the user.
pub trait ResultExtractor: Send + Sync {
    fn extract(&self, frame: &ResponseFrame) -> Result<Option<String>, DecodeError>;
}

fn provider_error(frame: &ResponseFrame) -> Result<(), DecodeError> {
    match &frame.error {
        Some(error) => Err(DecodeError::Provider {
            kind: error.kind.clone(),
            message: error.message.clone(),
        }),
        None => Ok(()),
    }
}

/// Legacy completions endpoint: `choices[0].text`
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionsExtractor;

impl ResultExtractor for CompletionsExtractor {
    fn extract(&self, frame: &ResponseFrame) -> Result<Option<String>, DecodeError> {
        provider_error(frame)?;
        Ok(frame.choices.first().and_then(|c| c.text.clone()))
    }
}

/// Chat completions endpoint: `choices[0].delta.content`, or
/// `choices[0].message.content` for single-shot responses
#[derive(Debug, Clone, Copy, Default)]
pub struct ChatExtractor;

impl ResultExtractor for ChatExtractor {
    fn extract(&self, frame: &ResponseFrame) -> Result<Option<String>, DecodeError> {
        provider_error(frame)?;
        let Some(choice) = frame.choices.first() else {
            return Ok(None);
        };
        let content = choice
            .delta
            .as_ref()
            .and_then(|d| d.content.clone())
            .or_else(|| choice.message.as_ref().and_then(|m| m.content.clone()));
        Ok(content)
    }
}

/// Which extractor a backend needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Completions,
    Chat,
}

pub fn extractor_for(kind: ExtractorKind) -> Box<dyn ResultExtractor> {
    match kind {
        ExtractorKind::Completions => Box::new(CompletionsExtractor),
        ExtractorKind::Chat => Box::new(ChatExtractor),
    }
}
