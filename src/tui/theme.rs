//! Terminal colors

use crossterm::style::Color;

/// Colors used by the chat shell
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub input_marker: Color,
    /// Streamed reply text
    pub reply: Color,
    pub notice: Color,
    pub failure: Color,
    pub muted: Color,
    pub heading: Color,
    /// Endpoint and other values worth spotting
    pub highlight: Color,
    pub command: Color,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            input_marker: Color::Green,
            reply: Color::Reset,
            notice: Color::DarkCyan,
            failure: Color::Red,
            muted: Color::DarkGrey,
            heading: Color::Cyan,
            highlight: Color::Blue,
            command: Color::Yellow,
        }
    }
}
