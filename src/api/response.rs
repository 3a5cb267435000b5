//! Wire-level result envelope shared by streamed frames and single-shot responses

use serde::{Deserialize, Serialize};

/// One result envelope: `{ error?: {...}, choices: [...] }`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<FrameError>,

    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameError {
    /// Error kind as reported by the provider (e.g. "rate_limit_exceeded")
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub message: String,
}

/// A candidate completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Completions-style text fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Chat-style streamed fragment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChoiceDelta>,

    /// Chat-style complete message (non-streaming)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChoiceDelta>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoiceDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ResponseFrame {
    pub fn error(kind: Option<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(FrameError {
                kind,
                message: message.into(),
            }),
            choices: Vec::new(),
        }
    }

    /// Build the error frame reported for a non-success HTTP response.
    ///
    /// A body that already carries an `error` object is kept as is; anything
    /// else is wrapped with the status line.
    pub fn from_error_body(status: reqwest::StatusCode, body: &str) -> Self {
        if let Ok(frame) = serde_json::from_str::<ResponseFrame>(body) {
            if frame.error.is_some() {
                return frame;
            }
        }

        let kind = status.canonical_reason().map(|r| r.to_string());
        let body = body.trim();
        let message = if body.is_empty() {
            status.to_string()
        } else {
            format!("{}: {}", status, body)
        };
        Self::error(kind, message)
    }
}
