//! Spinner shown while a request is connecting

use crate::stream::LifecycleHandlers;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const FRAMES: &[&str] = &["\u{25d0}", "\u{25d3}", "\u{25d1}", "\u{25d2}", " "];

/// Spins from request start until the stream opens or the session ends
#[derive(Default)]
pub struct ConnectSpinner {
    bar: Option<ProgressBar>,
}

impl ConnectSpinner {
    /// Show a spinner with `label` right away
    pub fn show(label: &str) -> Self {
        let style = ProgressStyle::with_template("  {spinner:.cyan} {msg:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(FRAMES);
        let bar = ProgressBar::new_spinner()
            .with_style(style)
            .with_message(label.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    pub fn is_spinning(&self) -> bool {
        self.bar.is_some()
    }

    pub fn clear(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

impl LifecycleHandlers for ConnectSpinner {
    fn on_open(&mut self) {
        self.clear();
    }

    fn on_close(&mut self) {
        self.clear();
    }
}

impl Drop for ConnectSpinner {
    fn drop(&mut self) {
        self.clear();
    }
}
