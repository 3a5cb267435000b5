//! Drives a stream session from transport events

use super::session::{StreamPhase, StreamSession};
use super::sink::{FailureDisplay, LifecycleHandlers, MessageSink};
use super::{StreamError, StreamOutcome};
use crate::api::{
    decode_frame, AbortHandle, DecodedFrame, ResultExtractor, StreamRequest, Transport,
    TransportEvent,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const INVALID_STREAM_RESPONSE: &str = "Received an invalid response from the stream";
const INVALID_RESPONSE: &str = "Received an invalid response from the service";

/// Everything that can move a session forward
#[derive(Debug)]
pub enum StreamInput {
    Transport(TransportEvent),
    Abort,
}

/// Whether the session needs more input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done(StreamOutcome),
}

/// State machine for one streaming request
pub struct StreamController<'a, S, L>
where
    S: MessageSink + FailureDisplay,
    L: LifecycleHandlers,
{
    session: StreamSession<'a, S, L>,
    extractor: &'a dyn ResultExtractor,
}

impl<'a, S, L> StreamController<'a, S, L>
where
    S: MessageSink + FailureDisplay,
    L: LifecycleHandlers,
{
    pub fn new(sink: &'a mut S, handlers: &'a mut L, extractor: &'a dyn ResultExtractor) -> Self {
        Self {
            session: StreamSession::new(sink, handlers),
            extractor,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.session.phase()
    }

    /// Mark the request as issued
    pub fn begin(&mut self) -> Result<(), StreamError> {
        self.session.begin()
    }

    /// Apply one input. Returns `Flow::Done` once the session is finished;
    /// session-level failures come back as `Err` after the lifecycle has been
    /// settled.
    ///
    /// An input the current state does not accept ends an active session as a
    /// failure, so an open target is still sealed and `on_close` still fires.
    pub fn step(&mut self, input: StreamInput) -> Result<Flow, StreamError> {
        let result = self.apply(input);
        if let Err(StreamError::InvalidTransition { from, input }) = &result {
            if self.session.is_active() {
                error!(%from, input, "Out-of-order stream event, ending session");
                self.session.fail()?;
                self.session.sink().display_error(INVALID_STREAM_RESPONSE);
            }
        }
        result
    }

    fn apply(&mut self, input: StreamInput) -> Result<Flow, StreamError> {
        let event = match input {
            StreamInput::Abort => {
                info!(phase = %self.phase(), "Stream cancelled");
                self.session.cancel()?;
                return Ok(Flow::Done(StreamOutcome::Cancelled));
            }
            StreamInput::Transport(event) => event,
        };

        match event {
            TransportEvent::Opened => {
                self.session.open()?;
                Ok(Flow::Continue)
            }
            TransportEvent::OpenFailed { status, frame } => {
                self.session.reject()?;
                let message = match self.extractor.extract(&frame) {
                    Err(e) => e.to_string(),
                    Ok(_) => format!("Request failed with status {}", status),
                };
                error!(status, message = %message, "Stream connection rejected");
                self.session.sink().display_error(&message);
                Err(StreamError::Open { status, message })
            }
            TransportEvent::Message(data) => {
                self.on_message(&data)?;
                Ok(Flow::Continue)
            }
            TransportEvent::Failed(err) => {
                error!(phase = %self.phase(), error = %err, "Stream failed");
                self.session.fail()?;
                self.session.sink().display_error(&err.user_message());
                Err(StreamError::Transport(err))
            }
            TransportEvent::Closed => {
                self.session.close()?;
                Ok(Flow::Done(StreamOutcome::Completed))
            }
        }
    }

    fn on_message(&mut self, data: &str) -> Result<(), StreamError> {
        let phase = self.phase();
        if !matches!(phase, StreamPhase::Open | StreamPhase::Streaming) {
            return Err(StreamError::InvalidTransition {
                from: phase,
                input: "message",
            });
        }

        let frame = match decode_frame(data) {
            Ok(DecodedFrame::Done) => {
                debug!("Stream sentinel received");
                return Ok(());
            }
            Ok(DecodedFrame::Result(frame)) => frame,
            Err(e) => {
                // One bad frame does not end the stream
                warn!(error = %e, data, "Dropping malformed stream frame");
                return Ok(());
            }
        };

        match self.extractor.extract(&frame) {
            Ok(Some(text)) => self.session.push(&text),
            Ok(None) => {
                error!(data, "{}", INVALID_STREAM_RESPONSE);
                Ok(())
            }
            Err(e) => {
                self.session.sink().display_error(&e.to_string());
                Ok(())
            }
        }
    }

    /// Consume transport events until the session finishes or `abort` fires.
    /// A channel that ends without `Closed` counts as a graceful close.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<TransportEvent>,
        abort: &AbortHandle,
    ) -> Result<StreamOutcome, StreamError> {
        loop {
            let input = tokio::select! {
                biased;
                _ = abort.aborted() => StreamInput::Abort,
                event = events.recv() => {
                    StreamInput::Transport(event.unwrap_or(TransportEvent::Closed))
                }
            };
            if let Flow::Done(outcome) = self.step(input)? {
                return Ok(outcome);
            }
        }
    }
}

/// Stream a completion into `sink`.
pub async fn request<T, S, L>(
    transport: &T,
    request: StreamRequest,
    extractor: &dyn ResultExtractor,
    sink: &mut S,
    handlers: &mut L,
    abort: &AbortHandle,
) -> Result<StreamOutcome, StreamError>
where
    T: Transport + ?Sized,
    S: MessageSink + FailureDisplay,
    L: LifecycleHandlers,
{
    let mut controller = StreamController::new(sink, handlers, extractor);
    controller.begin()?;
    if abort.is_aborted() {
        debug!("Aborted before the request was sent");
        controller.step(StreamInput::Abort)?;
        return Ok(StreamOutcome::Cancelled);
    }
    debug!(url = %request.url, method = %request.method, "Opening stream");
    let events = transport.open(request, abort.clone()).await;
    controller.run(events, abort).await
}

/// Fetch a completion in one response and add it to `sink` as a whole message.
pub async fn complete<T, S>(
    transport: &T,
    request: StreamRequest,
    extractor: &dyn ResultExtractor,
    sink: &mut S,
) -> Result<String, StreamError>
where
    T: Transport + ?Sized,
    S: MessageSink + FailureDisplay,
{
    let frame = match transport.request(request).await {
        Ok(frame) => frame,
        Err(e) => {
            error!(error = %e, "Completion request failed");
            sink.display_error(&e.user_message());
            return Err(StreamError::Transport(e));
        }
    };

    match extractor.extract(&frame) {
        Ok(Some(text)) => {
            let mut handle = sink.create();
            sink.append(&mut handle, &text);
            sink.finalize(handle);
            Ok(text)
        }
        Ok(None) => {
            error!(?frame, "{}", INVALID_RESPONSE);
            sink.display_error(INVALID_RESPONSE);
            Err(StreamError::EmptyResponse)
        }
        Err(e) => {
            sink.display_error(&e.to_string());
            Err(StreamError::Decode(e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        ApiError, CompletionsExtractor, DecodeError, IdentityInterceptor, RequestSettings,
        ResponseFrame,
    };
    use crate::stream::sink::testing::{CountingHandlers, RecordingSink, SinkCall};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn frame(text: &str) -> TransportEvent {
        TransportEvent::Message(json!({"choices": [{"text": text}]}).to_string())
    }

    fn sentinel() -> TransportEvent {
        TransportEvent::Message("[DONE]".to_string())
    }

    /// Transport that replays a fixed event script
    struct ScriptedTransport {
        events: Mutex<Vec<TransportEvent>>,
        single: Mutex<Option<Result<ResponseFrame, ApiError>>>,
        opened: AtomicUsize,
    }

    impl ScriptedTransport {
        fn new(events: Vec<TransportEvent>) -> Self {
            Self {
                events: Mutex::new(events),
                single: Mutex::new(None),
                opened: AtomicUsize::new(0),
            }
        }

        fn single(result: Result<ResponseFrame, ApiError>) -> Self {
            let transport = Self::new(Vec::new());
            *transport.single.lock().unwrap() = Some(result);
            transport
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&self, _request: StreamRequest, _abort: AbortHandle) -> mpsc::Receiver<TransportEvent> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let events: Vec<_> = self.events.lock().unwrap().drain(..).collect();
            let (tx, rx) = mpsc::channel(events.len().max(1));
            for event in events {
                tx.try_send(event).unwrap();
            }
            rx
        }

        async fn request(&self, _request: StreamRequest) -> Result<ResponseFrame, ApiError> {
            self.single.lock().unwrap().take().unwrap()
        }
    }

    /// Records every frame handed to extraction
    #[derive(Default)]
    struct SpyExtractor {
        seen: Mutex<Vec<ResponseFrame>>,
    }

    impl ResultExtractor for SpyExtractor {
        fn extract(&self, frame: &ResponseFrame) -> Result<Option<String>, DecodeError> {
            self.seen.lock().unwrap().push(frame.clone());
            CompletionsExtractor.extract(frame)
        }
    }

    fn stream_request() -> StreamRequest {
        StreamRequest::new(
            &RequestSettings::new("http://localhost/v1/completions"),
            json!({"prompt": "Hi", "stream": true}),
            &IdentityInterceptor,
        )
    }

    async fn run_script(
        events: Vec<TransportEvent>,
        sink: &mut RecordingSink,
        handlers: &mut CountingHandlers,
    ) -> Result<StreamOutcome, StreamError> {
        let transport = ScriptedTransport::new(events);
        request(
            &transport,
            stream_request(),
            &CompletionsExtractor,
            sink,
            handlers,
            &AbortHandle::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_frames_append_in_order_then_finalize() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        let outcome = run_script(
            vec![TransportEvent::Opened, frame("A"), frame("B"), sentinel(), TransportEvent::Closed],
            &mut sink,
            &mut handlers,
        )
        .await
        .unwrap();

        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(
            sink.calls,
            vec![
                SinkCall::Create,
                SinkCall::Append("A".into()),
                SinkCall::Append("B".into()),
                SinkCall::Finalize,
            ]
        );
        assert_eq!(handlers.opened, 1);
        assert_eq!(handlers.closed, 1);
    }

    #[tokio::test]
    async fn test_sentinel_never_reaches_extractor() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let extractor = SpyExtractor::default();
        let transport = ScriptedTransport::new(vec![
            TransportEvent::Opened,
            sentinel(),
            TransportEvent::Closed,
        ]);

        request(
            &transport,
            stream_request(),
            &extractor,
            &mut sink,
            &mut handlers,
            &AbortHandle::new(),
        )
        .await
        .unwrap();

        assert!(extractor.seen.lock().unwrap().is_empty());
        assert!(sink.appends().is_empty());
        assert_eq!(sink.count(&SinkCall::Finalize), 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_does_not_end_stream() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        let outcome = run_script(
            vec![
                TransportEvent::Opened,
                frame("A"),
                TransportEvent::Message("{broken".to_string()),
                TransportEvent::Message(r#"{"choices":[]}"#.to_string()),
                frame("B"),
                TransportEvent::Closed,
            ],
            &mut sink,
            &mut handlers,
        )
        .await;

        assert_eq!(outcome.unwrap(), StreamOutcome::Completed);
        assert_eq!(sink.appends(), vec!["A", "B"]);
        assert!(sink.errors().is_empty());
    }

    #[tokio::test]
    async fn test_error_frame_is_displayed_and_stream_continues() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        run_script(
            vec![
                TransportEvent::Opened,
                TransportEvent::Message(r#"{"error":{"message":"content filtered"}}"#.to_string()),
                frame("after"),
                TransportEvent::Closed,
            ],
            &mut sink,
            &mut handlers,
        )
        .await
        .unwrap();

        assert_eq!(sink.errors(), vec!["content filtered"]);
        assert_eq!(sink.appends(), vec!["after"]);
        assert_eq!(sink.count(&SinkCall::Finalize), 1);
    }

    #[tokio::test]
    async fn test_open_rejected_with_429() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let transport = ScriptedTransport::new(vec![TransportEvent::OpenFailed {
            status: 429,
            frame: ResponseFrame::error(Some("requests".into()), "Rate limit reached"),
        }]);

        let err = request(
            &transport,
            stream_request(),
            &CompletionsExtractor,
            &mut sink,
            &mut handlers,
            &AbortHandle::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StreamError::Open { status: 429, .. }));
        assert_eq!(sink.count(&SinkCall::Create), 0);
        assert_eq!(sink.errors(), vec!["Rate limit reached"]);
        assert_eq!(handlers.opened, 0);
        assert_eq!(handlers.closed, 0);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_rejected_without_error_body() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        let err = run_script(
            vec![TransportEvent::OpenFailed {
                status: 503,
                frame: ResponseFrame::default(),
            }],
            &mut sink,
            &mut handlers,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StreamError::Open { status: 503, .. }));
        assert_eq!(sink.errors(), vec!["Request failed with status 503"]);
    }

    #[tokio::test]
    async fn test_transport_failure_mid_stream() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        let err = run_script(
            vec![
                TransportEvent::Opened,
                frame("A"),
                TransportEvent::Failed(ApiError::Transport("connection reset".into())),
                frame("never"),
            ],
            &mut sink,
            &mut handlers,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StreamError::Transport(ApiError::Transport(_))));
        assert_eq!(
            sink.calls,
            vec![
                SinkCall::Create,
                SinkCall::Append("A".into()),
                SinkCall::Finalize,
                SinkCall::Error("The response stream was interrupted".into()),
            ]
        );
        assert_eq!(handlers.closed, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_before_open() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        let err = run_script(
            vec![TransportEvent::Failed(ApiError::Transport("refused".into()))],
            &mut sink,
            &mut handlers,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, StreamError::Transport(_)));
        assert_eq!(sink.count(&SinkCall::Create), 0);
        assert_eq!(handlers.opened, 0);
        assert_eq!(handlers.closed, 1);
    }

    #[tokio::test]
    async fn test_abort_before_any_event() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let transport = ScriptedTransport::new(vec![TransportEvent::Opened, frame("A"), TransportEvent::Closed]);
        let abort = AbortHandle::new();
        abort.abort();

        let outcome = request(
            &transport,
            stream_request(),
            &CompletionsExtractor,
            &mut sink,
            &mut handlers,
            &abort,
        )
        .await
        .unwrap();

        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(sink.calls, vec![SinkCall::Create, SinkCall::Finalize]);
        assert_eq!(handlers.opened, 0);
        assert_eq!(handlers.closed, 1);
        // Nothing is sent once the caller has given up
        assert_eq!(transport.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_abort_mid_stream_stops_appends() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let extractor = CompletionsExtractor;
        let abort = AbortHandle::new();
        let (tx, rx) = mpsc::channel(8);

        let mut controller = StreamController::new(&mut sink, &mut handlers, &extractor);
        controller.begin().unwrap();
        tx.send(TransportEvent::Opened).await.unwrap();
        tx.send(frame("A")).await.unwrap();

        let outcome = {
            let run = controller.run(rx, &abort);
            tokio::pin!(run);

            // Let the first two events drain, then abort with frames still queued
            tokio::select! {
                _ = &mut run => panic!("stream should still be running"),
                _ = tokio::task::yield_now() => {}
            }
            tx.send(frame("B")).await.unwrap();
            abort.abort();
            tx.send(TransportEvent::Closed).await.unwrap();

            run.await.unwrap()
        };
        assert_eq!(outcome, StreamOutcome::Cancelled);
        assert_eq!(sink.appends(), vec!["A"]);
        assert_eq!(sink.count(&SinkCall::Finalize), 1);
        assert_eq!(handlers.closed, 1);
    }

    #[test]
    fn test_message_before_open_is_invalid() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let mut controller = StreamController::new(&mut sink, &mut handlers, &CompletionsExtractor);
        controller.begin().unwrap();

        let err = controller
            .step(StreamInput::Transport(frame("early")))
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::InvalidTransition { from: StreamPhase::Connecting, input: "message" }
        ));
    }

    #[tokio::test]
    async fn test_unexpected_event_still_seals_target() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();

        let result = run_script(
            vec![TransportEvent::Opened, frame("A"), TransportEvent::Opened, TransportEvent::Closed],
            &mut sink,
            &mut handlers,
        )
        .await;

        assert!(matches!(
            result,
            Err(StreamError::InvalidTransition { from: StreamPhase::Streaming, input: "open" })
        ));
        assert_eq!(
            sink.calls,
            vec![
                SinkCall::Create,
                SinkCall::Append("A".into()),
                SinkCall::Finalize,
                SinkCall::Error(INVALID_STREAM_RESPONSE.to_string()),
            ]
        );
        assert_eq!(handlers.opened, 1);
        assert_eq!(handlers.closed, 1);
    }

    #[test]
    fn test_message_while_connecting_ends_session() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let mut controller = StreamController::new(&mut sink, &mut handlers, &CompletionsExtractor);
        controller.begin().unwrap();

        assert!(controller.step(StreamInput::Transport(frame("early"))).is_err());
        assert_eq!(controller.phase(), StreamPhase::Error);
        assert!(controller.step(StreamInput::Transport(TransportEvent::Closed)).is_err());
        drop(controller);

        assert_eq!(sink.count(&SinkCall::Create), 0);
        assert_eq!(sink.errors(), vec![INVALID_STREAM_RESPONSE]);
        assert_eq!(handlers.closed, 1);
    }

    #[test]
    fn test_abort_after_close_is_invalid() {
        let mut sink = RecordingSink::default();
        let mut handlers = CountingHandlers::default();
        let mut controller = StreamController::new(&mut sink, &mut handlers, &CompletionsExtractor);
        controller.begin().unwrap();
        controller.step(StreamInput::Transport(TransportEvent::Opened)).unwrap();
        assert_eq!(
            controller.step(StreamInput::Transport(TransportEvent::Closed)).unwrap(),
            Flow::Done(StreamOutcome::Completed)
        );
        assert!(controller.step(StreamInput::Abort).is_err());
        drop(controller);

        assert_eq!(sink.count(&SinkCall::Finalize), 1);
        assert_eq!(handlers.closed, 1);
    }

    #[tokio::test]
    async fn test_complete_single_shot() {
        let mut sink = RecordingSink::default();
        let transport = ScriptedTransport::single(Ok(serde_json::from_str(
            r#"{"choices":[{"text":"Whole reply"}]}"#,
        )
        .unwrap()));

        let text = complete(&transport, stream_request(), &CompletionsExtractor, &mut sink)
            .await
            .unwrap();

        assert_eq!(text, "Whole reply");
        assert_eq!(
            sink.calls,
            vec![
                SinkCall::Create,
                SinkCall::Append("Whole reply".into()),
                SinkCall::Finalize,
            ]
        );
    }

    #[tokio::test]
    async fn test_complete_provider_error() {
        let mut sink = RecordingSink::default();
        let transport = ScriptedTransport::single(Ok(ResponseFrame::error(None, "Invalid API key")));

        let err = complete(&transport, stream_request(), &CompletionsExtractor, &mut sink)
            .await
            .unwrap_err();

        assert!(matches!(err, StreamError::Decode(DecodeError::Provider { .. })));
        assert_eq!(sink.calls, vec![SinkCall::Error("Invalid API key".into())]);
    }

    #[tokio::test]
    async fn test_complete_transport_error() {
        let mut sink = RecordingSink::default();
        let transport = ScriptedTransport::single(Err(ApiError::Transport("gone".into())));

        let err = complete(&transport, stream_request(), &CompletionsExtractor, &mut sink).await;

        tokio_test::assert_err!(err);
        assert_eq!(sink.count(&SinkCall::Create), 0);
        assert_eq!(sink.errors().len(), 1);
    }
}
