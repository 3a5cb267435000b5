//! Interactive terminal chat
//!
//! Streams replies word by word into the terminal, shows a spinner until the
//! stream opens and lets Ctrl+C stop a reply without leaving the shell.

pub mod commands;
pub mod interrupt;
pub mod prompt;
pub mod renderer;
pub mod spinner;
pub mod theme;

use crate::api::{CallOutcome, ChatMessage, CompletionsService, HttpTransport};
use crate::config::Config;
use crate::stream::StreamOutcome;

use commands::{parse_command, render_help, SlashCommand};
use interrupt::InterruptGuard;
use prompt::LineReader;
use renderer::TerminalSink;
use spinner::ConnectSpinner;

use anyhow::Result;
use tracing::debug;

/// Run one request with spinner and interrupt handling, rendering into `sink`
pub async fn send_turn(
    service: &CompletionsService,
    messages: &[ChatMessage],
    sink: &mut TerminalSink,
    interrupts: &InterruptGuard,
) -> Option<String> {
    let abort = interrupts.begin_turn();
    let mut spinner = ConnectSpinner::show("Connecting...");

    let result = service.call_api(messages, sink, &mut spinner, &abort).await;

    interrupts.end_turn();
    spinner.clear();

    match result {
        Ok(CallOutcome::Streamed(StreamOutcome::Cancelled)) => {
            sink.render_system("Response stopped.");
        }
        Ok(_) => {}
        // The sink has already shown the failure
        Err(e) => debug!(error = %e, "Turn ended with an error"),
    }

    sink.take_reply().filter(|reply| !reply.trim().is_empty())
}

/// Interactive shell with multi-turn history
pub struct ChatShell {
    config: Config,
    service: CompletionsService,
    renderer: TerminalSink,
    input: LineReader,
    interrupts: InterruptGuard,
    /// Conversation history (user + assistant messages)
    conversation: Vec<ChatMessage>,
    turn_count: usize,
}

impl ChatShell {
    /// Must be called inside a tokio runtime
    pub fn new(config: Config) -> Self {
        let service = CompletionsService::from_config(&config);
        Self {
            config,
            service,
            renderer: TerminalSink::new(),
            input: LineReader::new(),
            interrupts: InterruptGuard::install(),
            conversation: Vec::new(),
            turn_count: 0,
        }
    }

    /// Run the interactive shell main loop
    pub async fn run(&mut self) -> Result<()> {
        self.renderer.render_banner(
            env!("CARGO_PKG_VERSION"),
            &self.config.request.url,
            &self.config.completions.model,
        );

        while let Some(input) = self.input.next_line(self.renderer.input_color()) {
            if input.is_empty() {
                continue;
            }

            if let Some(cmd) = parse_command(&input) {
                if let CommandResult::Quit = self.handle_command(cmd).await {
                    break;
                }
            } else if CompletionsService::<HttpTransport>::can_send_message(&input) {
                self.process_message(&input).await;
            }
        }

        self.renderer.render_info(&format!(
            "{} turns, {} lines entered. Goodbye!",
            self.turn_count,
            self.input.entered()
        ));
        Ok(())
    }

    async fn handle_command(&mut self, cmd: SlashCommand) -> CommandResult {
        match cmd {
            SlashCommand::Help => render_help(&self.renderer),
            SlashCommand::Quit => return CommandResult::Quit,
            SlashCommand::Clear => {
                self.conversation.clear();
                self.renderer.render_system("Conversation history cleared.");
            }
            SlashCommand::Simulate(text) => {
                let abort = self.interrupts.begin_turn();
                let outcome = self
                    .service
                    .simulate(&text, &mut self.renderer, &mut (), &abort)
                    .await;
                self.interrupts.end_turn();
                if let Ok(StreamOutcome::Cancelled) = outcome {
                    self.renderer.render_system("Simulation stopped.");
                }
                // Simulated text stays out of the conversation
                self.renderer.take_reply();
            }
            SlashCommand::Status => self.render_status(),
        }
        CommandResult::Continue
    }

    /// Send the turn and record the reply in history
    async fn process_message(&mut self, input: &str) {
        self.conversation.push(ChatMessage::user(input));

        let reply = send_turn(
            &self.service,
            &self.conversation,
            &mut self.renderer,
            &self.interrupts,
        )
        .await;

        match reply {
            Some(reply) => {
                self.conversation.push(ChatMessage::assistant(reply));
                self.turn_count += 1;
            }
            // Keep history alternating so the next prompt is not skewed
            None => {
                self.conversation.pop();
            }
        }
    }

    fn render_status(&self) {
        println!();
        self.renderer.render_system("Current Status:");
        self.renderer
            .render_info(&format!("Endpoint:   {}", self.service.settings().url));
        self.renderer.render_info(&format!(
            "Model:      {}",
            self.config.completions.model
        ));
        self.renderer.render_info(&format!(
            "Mode:       {}",
            if self.service.settings().is_demo() {
                "simulated"
            } else if self.service.is_streaming() {
                "streaming"
            } else {
                "single response"
            }
        ));
        self.renderer
            .render_info(&format!("History:    {} messages", self.conversation.len()));
        println!();
    }
}

enum CommandResult {
    Continue,
    Quit,
}
