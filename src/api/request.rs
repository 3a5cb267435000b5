//! API request structures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Target URL that routes requests to the simulated stream instead of the network
pub const DEMO_URL: &str = "demo";

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Where and how requests are sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSettings {
    pub url: String,
    /// HTTP method, POST unless overridden
    pub method: String,
    pub headers: BTreeMap<String, String>,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            url: "https://api.openai.com/v1/completions".to_string(),
            method: "POST".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

impl RequestSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Attach the bearer credential and JSON content type
    pub fn with_key(mut self, key: &str) -> Self {
        self.headers
            .insert("Authorization".to_string(), format!("Bearer {}", key));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn is_demo(&self) -> bool {
        self.url == DEMO_URL
    }
}

/// Body and headers as seen by a [`RequestInterceptor`]
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDetails {
    pub body: Value,
    pub headers: BTreeMap<String, String>,
}

/// Rewrites a request right before it is handed to the transport
pub trait RequestInterceptor: Send + Sync {
    fn intercept(&self, details: RequestDetails) -> RequestDetails;
}

/// Leaves requests untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityInterceptor;

impl RequestInterceptor for IdentityInterceptor {
    fn intercept(&self, details: RequestDetails) -> RequestDetails {
        details
    }
}

impl<F> RequestInterceptor for F
where
    F: Fn(RequestDetails) -> RequestDetails + Send + Sync,
{
    fn intercept(&self, details: RequestDetails) -> RequestDetails {
        self(details)
    }
}
