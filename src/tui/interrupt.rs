//! Ctrl+C routing
//!
//! Once tokio listens for Ctrl+C the default handler is gone for good, so a
//! single listener lives as long as the shell. It stops the running turn if
//! there is one and exits the process otherwise.

use crate::api::AbortHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Exit status used when Ctrl+C is pressed at the prompt
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptAction {
    /// A turn was running and has been told to stop
    Aborted,
    /// Nothing was running
    Exit,
}

pub struct InterruptGuard {
    current: watch::Sender<Option<AbortHandle>>,
    listener: Option<JoinHandle<()>>,
}

impl InterruptGuard {
    /// Routing only; no signal listener
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            listener: None,
        }
    }

    /// Listen for Ctrl+C for the life of the guard. Must run inside a tokio runtime.
    pub fn install() -> Self {
        let mut guard = Self::new();
        let current = guard.current.subscribe();
        guard.listener = Some(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                let running = current.borrow().clone();
                if route(running.as_ref()) == InterruptAction::Exit {
                    info!("Interrupt received at the prompt, exiting");
                    std::process::exit(INTERRUPTED_EXIT_CODE);
                }
            }
        }));
        guard
    }

    /// Start a turn; Ctrl+C aborts it until [`end_turn`](Self::end_turn)
    pub fn begin_turn(&self) -> AbortHandle {
        let abort = AbortHandle::new();
        self.current.send_replace(Some(abort.clone()));
        abort
    }

    pub fn end_turn(&self) {
        self.current.send_replace(None);
    }

    /// Act on an interrupt as the listener would
    pub fn interrupt(&self) -> InterruptAction {
        route(self.current.borrow().as_ref())
    }

    pub fn turn_running(&self) -> bool {
        self.current.borrow().is_some()
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
    }
}

fn route(running: Option<&AbortHandle>) -> InterruptAction {
    match running {
        Some(abort) => {
            info!("Interrupt received, aborting response");
            abort.abort();
            InterruptAction::Aborted
        }
        None => InterruptAction::Exit,
    }
}
