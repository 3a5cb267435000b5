//! Terminal rendering of streamed replies

use crossterm::style::{Color, Stylize};
use std::io::Write;
use termimad::MadSkin;

use super::theme::Palette;
use crate::stream::{FailureDisplay, MessageSink};

/// A reply being written to the terminal
#[derive(Debug, Default)]
pub struct StreamedReply {
    content: String,
}

impl StreamedReply {
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Terminal renderer; acts as the message sink for the chat shell
pub struct TerminalSink {
    palette: Palette,
    skin: MadSkin,
    last_reply: Option<String>,
}

impl TerminalSink {
    pub fn new() -> Self {
        let palette = Palette::default();
        let skin = Self::build_skin(&palette);
        Self {
            palette,
            skin,
            last_reply: None,
        }
    }

    fn build_skin(palette: &Palette) -> MadSkin {
        let mut skin = MadSkin::default();
        skin.set_headers_fg(to_termimad_color(palette.heading));
        skin.bold.set_fg(to_termimad_color(Color::White));
        skin.italic.set_fg(to_termimad_color(Color::DarkYellow));
        skin.inline_code.set_fg(to_termimad_color(Color::Green));
        skin.code_block.set_fg(to_termimad_color(Color::Green));
        skin
    }

    /// Text of the most recently sealed reply, if any
    pub fn take_reply(&mut self) -> Option<String> {
        self.last_reply.take()
    }

    /// Render the welcome banner
    pub fn render_banner(&self, version: &str, url: &str, model: &str) {
        println!();
        println!("{}", "  stream-chat".with(self.palette.heading));
        println!(
            "  {} {}",
            "v".with(self.palette.muted),
            version.with(self.palette.muted)
        );
        println!(
            "  {} {} ({})",
            "Endpoint:".with(self.palette.muted),
            url.with(self.palette.highlight),
            model.with(self.palette.muted),
        );
        println!(
            "  {}",
            "Type /help for commands, Ctrl+C stops a reply, /quit exits".with(self.palette.muted)
        );
        println!();
    }

    /// Render a system message
    pub fn render_system(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{25b6}".with(self.palette.notice),
            msg.with(self.palette.notice)
        );
    }

    /// Render an error message
    pub fn render_error(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{2717}".with(self.palette.failure),
            msg.with(self.palette.failure)
        );
    }

    /// Render info text
    pub fn render_info(&self, msg: &str) {
        println!("  {}", msg.with(self.palette.muted));
    }

    pub fn input_color(&self) -> Color {
        self.palette.input_marker
    }

    pub fn command_color(&self) -> Color {
        self.palette.command
    }

    pub fn dim_color(&self) -> Color {
        self.palette.muted
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageSink for TerminalSink {
    type Handle = StreamedReply;

    fn create(&mut self) -> StreamedReply {
        println!();
        StreamedReply::default()
    }

    fn append(&mut self, handle: &mut StreamedReply, text: &str) {
        handle.content.push_str(text);
        print!("{}", text.with(self.palette.reply));
        let _ = std::io::stdout().flush();
    }

    fn finalize(&mut self, handle: StreamedReply) {
        // Re-render with markdown only when the raw stream would look wrong
        if has_markdown_elements(&handle.content) {
            println!();
            self.skin.print_text(&handle.content);
        } else {
            println!();
        }
        println!();
        self.last_reply = Some(handle.content);
    }
}

impl FailureDisplay for TerminalSink {
    fn display_error(&mut self, message: &str) {
        self.render_error(message);
    }
}

/// Check if content has markdown elements worth re-rendering
fn has_markdown_elements(content: &str) -> bool {
    content.contains("```")
        || content.contains("## ")
        || content.contains("# ")
        || content.contains("**")
        || content.contains("| ")
        || content.contains("- [")
}

/// Convert crossterm Color to termimad color
fn to_termimad_color(color: Color) -> termimad::crossterm::style::Color {
    use termimad::crossterm::style::Color as T;
    match color {
        Color::Black => T::Black,
        Color::DarkGrey => T::DarkGrey,
        Color::Red => T::Red,
        Color::DarkRed => T::DarkRed,
        Color::Green => T::Green,
        Color::DarkGreen => T::DarkGreen,
        Color::Yellow => T::Yellow,
        Color::DarkYellow => T::DarkYellow,
        Color::Blue => T::Blue,
        Color::DarkBlue => T::DarkBlue,
        Color::Magenta => T::Magenta,
        Color::DarkMagenta => T::DarkMagenta,
        Color::Cyan => T::Cyan,
        Color::DarkCyan => T::DarkCyan,
        Color::White => T::White,
        Color::Grey => T::Grey,
        _ => T::Reset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markdown_detection() {
        assert!(has_markdown_elements("```rust\nfn main() {}\n```"));
        assert!(has_markdown_elements("**bold**"));
        assert!(!has_markdown_elements("plain words only"));
    }

    #[test]
    fn test_sink_keeps_sealed_reply() {
        let mut sink = TerminalSink::new();
        let mut reply = sink.create();
        sink.append(&mut reply, "Hello ");
        sink.append(&mut reply, "world");
        assert_eq!(reply.content(), "Hello world");
        sink.finalize(reply);

        assert_eq!(sink.take_reply().as_deref(), Some("Hello world"));
        assert_eq!(sink.take_reply(), None);
    }
}
