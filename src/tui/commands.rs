//! Slash commands of the chat shell

use crossterm::style::Stylize;

#[derive(Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    /// Forget the conversation so far
    Clear,
    /// Replay text through the simulated stream
    Simulate(String),
    Status,
}

/// Parse a slash command from user input.
/// Returns None if the input is not a known slash command.
pub fn parse_command(input: &str) -> Option<SlashCommand> {
    let input = input.trim();
    if !input.starts_with('/') {
        return None;
    }

    let (cmd, rest) = match input.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (input, ""),
    };

    match cmd.to_lowercase().as_str() {
        "/help" | "/h" | "/?" => Some(SlashCommand::Help),
        "/quit" | "/q" | "/exit" => Some(SlashCommand::Quit),
        "/clear" | "/cls" => Some(SlashCommand::Clear),
        "/simulate" | "/sim" => Some(SlashCommand::Simulate(rest.to_string())),
        "/status" => Some(SlashCommand::Status),
        _ => None,
    }
}

/// Render help text for all slash commands
pub fn render_help(renderer: &super::renderer::TerminalSink) {
    let cmd_color = renderer.command_color();
    let dim_color = renderer.dim_color();

    println!();
    renderer.render_system("Available commands:");
    println!();

    let commands = [
        ("/help", "Show this help message"),
        ("/quit", "Exit the chat"),
        ("/clear", "Clear the conversation history"),
        ("/simulate <text>", "Stream <text> back without calling the API"),
        ("/status", "Show endpoint and session status"),
    ];

    for (cmd, desc) in &commands {
        println!("  {:<25} {}", cmd.with(cmd_color), desc.with(dim_color));
    }
    println!();
}
