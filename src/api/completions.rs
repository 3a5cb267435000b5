//! Completions endpoint service: body preparation and stream/single-shot dispatch

use super::client::{AbortHandle, HttpTransport, StreamRequest, Transport};
use super::request::{ChatMessage, IdentityInterceptor, RequestInterceptor, RequestSettings};
use super::sse::{extractor_for, CompletionsExtractor, ResultExtractor};
use crate::config::Config;
use crate::stream::{
    self, FailureDisplay, LifecycleHandlers, MessageSink, SimulatedStream, StreamError,
    StreamOutcome,
};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// Longest prompt, in characters, sent to the completions endpoint
pub const CONVERSE_MAX_CHAR_LENGTH: usize = 13352;

// Prompt and completion share this budget; roughly 3.5 characters per token
const FULL_TRANSACTION_MAX_TOKENS: f64 = 4000.0;
const CHARS_PER_TOKEN: f64 = 3.5;

const DEMO_RESPONSE: &str = "Hi there! This is a simulated response. \
    Point the request URL at a completions endpoint to get real answers.";

/// Result of one [`CompletionsService::call_api`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Text was streamed into the sink
    Streamed(StreamOutcome),
    /// The whole response arrived at once
    Completed(String),
}

/// Sends conversation turns to a completions endpoint
pub struct CompletionsService<T: Transport = HttpTransport> {
    transport: T,
    settings: RequestSettings,
    body: Map<String, Value>,
    max_char_length: usize,
    interceptor: Box<dyn RequestInterceptor>,
    extractor: Box<dyn ResultExtractor>,
    simulation: SimulatedStream,
}

impl CompletionsService<HttpTransport> {
    /// Build a service from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        let completions = &config.completions;

        let mut body = Map::new();
        body.insert("model".to_string(), json!(completions.model));
        body.insert("stream".to_string(), json!(completions.stream));
        if let Some(max_tokens) = completions.max_tokens {
            body.insert("max_tokens".to_string(), json!(max_tokens));
        }
        if let Some(temperature) = completions.temperature {
            body.insert("temperature".to_string(), json!(temperature));
        }

        Self::new(HttpTransport::new(), config.request_settings())
            .with_body(body)
            .with_max_char_length(completions.max_char_length)
            .with_extractor(extractor_for(completions.extractor))
            .with_simulation(SimulatedStream::new(
                Duration::from_millis(config.simulation.open_delay_ms),
                Duration::from_millis(config.simulation.interval_ms),
            ))
    }
}

impl<T: Transport> CompletionsService<T> {
    pub fn new(transport: T, settings: RequestSettings) -> Self {
        let mut body = Map::new();
        body.insert("model".to_string(), json!("text-davinci-003"));
        Self {
            transport,
            settings,
            body,
            max_char_length: CONVERSE_MAX_CHAR_LENGTH,
            interceptor: Box::new(IdentityInterceptor),
            extractor: Box::new(CompletionsExtractor),
            simulation: SimulatedStream::default(),
        }
    }

    /// Replace the base body merged into every request
    pub fn with_body(mut self, body: Map<String, Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_max_char_length(mut self, max_char_length: usize) -> Self {
        self.max_char_length = max_char_length;
        self
    }

    pub fn with_interceptor(mut self, interceptor: impl RequestInterceptor + 'static) -> Self {
        self.interceptor = Box::new(interceptor);
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ResultExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_simulation(mut self, simulation: SimulatedStream) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    pub fn is_streaming(&self) -> bool {
        self.body.get("stream").and_then(Value::as_bool).unwrap_or(false)
    }

    /// Whether `text` is worth sending
    pub fn can_send_message(text: &str) -> bool {
        !text.trim().is_empty()
    }

    /// Build the request body for the most recent message.
    ///
    /// The prompt is the latest message truncated to `max_char_length`
    /// characters; `max_tokens` defaults to whatever is left of the
    /// transaction budget.
    pub fn preprocess_body(&self, messages: &[ChatMessage]) -> Value {
        let latest = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let prompt: String = latest.chars().take(self.max_char_length).collect();
        let prompt_len = prompt.chars().count() as f64;
        let max_tokens = (FULL_TRANSACTION_MAX_TOKENS - prompt_len / CHARS_PER_TOKEN).floor() as i64;

        let mut body = Map::new();
        body.insert("prompt".to_string(), json!(prompt));
        body.insert("max_tokens".to_string(), json!(max_tokens));
        for (key, value) in &self.body {
            body.insert(key.clone(), value.clone());
        }
        Value::Object(body)
    }

    /// Send the conversation and render the reply into `sink`.
    ///
    /// Streams when the base body asks for it, otherwise waits for one full
    /// response. The demo URL replays a canned reply through the simulated
    /// stream.
    pub async fn call_api<S, L>(
        &self,
        messages: &[ChatMessage],
        sink: &mut S,
        handlers: &mut L,
        abort: &AbortHandle,
    ) -> Result<CallOutcome, StreamError>
    where
        S: MessageSink + FailureDisplay,
        L: LifecycleHandlers,
    {
        if self.settings.is_demo() {
            debug!("Demo URL configured, simulating stream");
            let outcome = self.simulation.run(DEMO_RESPONSE, sink, handlers, abort).await?;
            return Ok(CallOutcome::Streamed(outcome));
        }

        let body = self.preprocess_body(messages);
        let request = StreamRequest::new(&self.settings, body, self.interceptor.as_ref());

        if self.is_streaming() {
            let outcome = stream::request(
                &self.transport,
                request,
                self.extractor.as_ref(),
                sink,
                handlers,
                abort,
            )
            .await?;
            Ok(CallOutcome::Streamed(outcome))
        } else {
            let text =
                stream::complete(&self.transport, request, self.extractor.as_ref(), sink).await?;
            Ok(CallOutcome::Completed(text))
        }
    }

    /// Replay `text` through the simulated stream
    pub async fn simulate<S, L>(
        &self,
        text: &str,
        sink: &mut S,
        handlers: &mut L,
        abort: &AbortHandle,
    ) -> Result<StreamOutcome, StreamError>
    where
        S: MessageSink,
        L: LifecycleHandlers,
    {
        self.simulation.run(text, sink, handlers, abort).await
    }
}
