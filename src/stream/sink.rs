//! Destinations for streamed text and lifecycle notifications

/// The place streamed tokens are rendered to.
///
/// A handle is created at most once per session; `finalize` consumes it, so
/// nothing can be appended to a sealed target.
pub trait MessageSink {
    type Handle;

    /// Start a new, empty message
    fn create(&mut self) -> Self::Handle;

    /// Append a delta; calls arrive in wire order
    fn append(&mut self, handle: &mut Self::Handle, text: &str);

    /// Seal the message
    fn finalize(&mut self, handle: Self::Handle);
}

/// Surfaces user-visible failures (frame errors and session errors)
pub trait FailureDisplay {
    fn display_error(&mut self, message: &str);
}

/// Callbacks fired by a stream session
pub trait LifecycleHandlers {
    /// The connection opened and a message target exists
    fn on_open(&mut self) {}

    /// The session ended: gracefully, by error, or by cancellation
    fn on_close(&mut self) {}
}

impl LifecycleHandlers for () {}

/// Sink that accumulates finished messages in memory
#[derive(Debug, Default)]
pub struct BufferSink {
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

impl MessageSink for BufferSink {
    type Handle = String;

    fn create(&mut self) -> String {
        String::new()
    }

    fn append(&mut self, handle: &mut String, text: &str) {
        handle.push_str(text);
    }

    fn finalize(&mut self, handle: String) {
        self.messages.push(handle);
    }
}

impl FailureDisplay for BufferSink {
    fn display_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }
}
