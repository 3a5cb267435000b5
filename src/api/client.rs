//! HTTP transport for the completions endpoint

use super::request::{RequestDetails, RequestInterceptor, RequestSettings};
use super::response::ResponseFrame;
use super::ApiError;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::{header::ACCEPT, Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cancellation handle shared between the caller and a running stream
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the stream stop as soon as possible
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`abort`](Self::abort) has been called
    pub async fn aborted(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// A fully resolved request, after interception
#[derive(Debug, Clone, PartialEq)]
pub struct StreamRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl StreamRequest {
    /// Apply `interceptor` to `body` and the configured headers
    pub fn new(settings: &RequestSettings, body: Value, interceptor: &dyn RequestInterceptor) -> Self {
        let details = interceptor.intercept(RequestDetails {
            body,
            headers: settings.headers.clone(),
        });
        Self {
            url: settings.url.clone(),
            method: settings.method.clone(),
            headers: details.headers,
            body: details.body,
        }
    }
}

/// Raw lifecycle events of one streaming connection
#[derive(Debug)]
pub enum TransportEvent {
    /// Response headers arrived with a success status
    Opened,
    /// Response arrived with a non-success status
    OpenFailed { status: u16, frame: ResponseFrame },
    /// One event's data payload
    Message(String),
    /// Network or protocol failure; the connection is not retried
    Failed(ApiError),
    /// The server ended the stream
    Closed,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a streaming request. Events arrive on the returned channel in
    /// wire order; the channel ends after `Closed`, `Failed` or `OpenFailed`,
    /// or once `abort` fires.
    async fn open(&self, request: StreamRequest, abort: AbortHandle) -> mpsc::Receiver<TransportEvent>;

    /// Send a single request and decode its body once
    async fn request(&self, request: StreamRequest) -> Result<ResponseFrame, ApiError>;
}

/// [`Transport`] over reqwest with SSE decoding
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn build(&self, request: &StreamRequest) -> Result<RequestBuilder, ApiError> {
        let method = Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| ApiError::InvalidRequest(format!("Invalid HTTP method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        Ok(builder.json(&request.body))
    }
}

/// Error frame for a rejected response; a body that cannot be read leaves only the status
fn error_frame<E: fmt::Display>(status: StatusCode, body: Result<String, E>) -> ResponseFrame {
    let body = body.unwrap_or_else(|e| {
        warn!(%status, error = %e, "Could not read error response body");
        String::new()
    });
    ResponseFrame::from_error_body(status, &body)
}

async fn pump(builder: RequestBuilder, tx: mpsc::Sender<TransportEvent>) {
    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            let _ = tx.send(TransportEvent::Failed(e.into())).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let frame = error_frame(status, response.text().await);
        let _ = tx
            .send(TransportEvent::OpenFailed {
                status: status.as_u16(),
                frame,
            })
            .await;
        return;
    }

    if tx.send(TransportEvent::Opened).await.is_err() {
        return; // Receiver dropped
    }

    let mut events = std::pin::pin!(response.bytes_stream().eventsource());
    while let Some(event) = events.next().await {
        match event {
            Ok(event) => {
                if event.data.is_empty() {
                    continue;
                }
                if tx.send(TransportEvent::Message(event.data)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                let _ = tx
                    .send(TransportEvent::Failed(ApiError::Transport(e.to_string())))
                    .await;
                return;
            }
        }
    }

    let _ = tx.send(TransportEvent::Closed).await;
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self, request: StreamRequest, abort: AbortHandle) -> mpsc::Receiver<TransportEvent> {
        let (tx, rx) = mpsc::channel(64);

        let builder = match self.build(&request) {
            Ok(builder) => builder.header(ACCEPT, "text/event-stream"),
            Err(e) => {
                let _ = tx.try_send(TransportEvent::Failed(e));
                return rx;
            }
        };

        let token = abort.token();
        let url = request.url;
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => debug!(url = %url, "Stream connection aborted"),
                _ = pump(builder, tx) => {}
            }
        });

        rx
    }

    async fn request(&self, request: StreamRequest) -> Result<ResponseFrame, ApiError> {
        let response = self.build(&request)?.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Ok(ResponseFrame::from_error_body(status, &body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}
