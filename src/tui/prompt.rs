//! Line input for the chat shell

use crossterm::style::{Color, Stylize};
use std::io::{self, Write};

/// Reads user turns one line at a time
#[derive(Debug, Default)]
pub struct LineReader {
    entered: usize,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Print the input marker and wait for a line. `None` on EOF (Ctrl+D).
    pub fn next_line(&mut self, marker: Color) -> Option<String> {
        print!("{} ", "you \u{203a}".with(marker));
        io::stdout().flush().ok()?;

        let mut buf = String::new();
        if io::stdin().read_line(&mut buf).ok()? == 0 {
            return None;
        }
        let line = buf.trim();
        if !line.is_empty() {
            self.entered += 1;
        }
        Some(line.to_string())
    }

    /// Non-empty lines read so far
    pub fn entered(&self) -> usize {
        self.entered
    }
}
