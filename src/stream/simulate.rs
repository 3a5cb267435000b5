//! Timer-driven stand-in for a real stream, used for demos and offline mode

use super::session::StreamSession;
use super::sink::{LifecycleHandlers, MessageSink};
use super::{StreamError, StreamOutcome};
use crate::api::AbortHandle;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

/// Replays a full text one word at a time with the same lifecycle as a real
/// stream: `on_open` after the open delay, one append per interval, then a
/// single finalize and `on_close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedStream {
    pub open_delay: Duration,
    pub interval: Duration,
}

impl Default for SimulatedStream {
    fn default() -> Self {
        Self {
            open_delay: Duration::from_millis(400),
            interval: Duration::from_millis(70),
        }
    }
}

/// Sleep for `duration`; false if `abort` fired first
async fn tick(duration: Duration, abort: &AbortHandle) -> bool {
    tokio::select! {
        biased;
        _ = abort.aborted() => false,
        _ = sleep(duration) => true,
    }
}

impl SimulatedStream {
    pub fn new(open_delay: Duration, interval: Duration) -> Self {
        Self {
            open_delay,
            interval,
        }
    }

    pub async fn run<S, L>(
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
        let mut words = text.split_whitespace().peekable();
        let mut session = StreamSession::new(sink, handlers);
        session.begin()?;

        if !tick(self.open_delay, abort).await {
            info!("Simulated stream cancelled before open");
            session.cancel()?;
            return Ok(StreamOutcome::Cancelled);
        }
        session.open()?;

        loop {
            if !tick(self.interval, abort).await {
                info!(phase = %session.phase(), "Simulated stream cancelled");
                session.cancel()?;
                return Ok(StreamOutcome::Cancelled);
            }

            if let Some(word) = words.next() {
                session.push(&format!("{} ", word))?;
            }
            if words.peek().is_none() {
                debug!("Simulated stream exhausted");
                session.close()?;
                return Ok(StreamOutcome::Completed);
            }
        }
    }
}
