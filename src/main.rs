//! stream-chat CLI - chat with a completions endpoint, replies streamed word by word

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use stream_chat::{
    api::{ChatMessage, CompletionsService, HttpTransport, DEMO_URL},
    config::Config,
    stream::StreamOutcome,
    tui::{self, interrupt::InterruptGuard, renderer::TerminalSink, ChatShell},
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "stream-chat")]
#[command(about = "Chat with a language model, streaming replies into the terminal")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the simulated stream instead of the configured endpoint
    #[arg(long, global = true)]
    demo: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Send one prompt and print the reply
    Send {
        /// Prompt text
        #[arg(short, long)]
        prompt: String,

        /// Wait for the whole reply instead of streaming it
        #[arg(long)]
        no_stream: bool,
    },

    /// Stream text back through the simulated stream
    Simulate {
        /// Text to replay word by word
        #[arg(short, long)]
        text: String,
    },

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Validate configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.unwrap_or_else(Config::default_path);

    match cli.command {
        Commands::Chat => {
            let config = load_config(&config_path, cli.demo)?;
            run_chat(config).await?;
        }
        Commands::Send { prompt, no_stream } => {
            let mut config = load_config(&config_path, cli.demo)?;
            if no_stream {
                config.completions.stream = false;
            }
            run_send(config, prompt).await?;
        }
        Commands::Simulate { text } => {
            let config = load_config(&config_path, cli.demo)?;
            run_simulate(config, &text).await?;
        }
        Commands::Config(cmd) => {
            run_config_command(cmd, config_path)?;
        }
    }

    Ok(())
}

fn load_config(path: &Path, demo: bool) -> Result<Config> {
    let mut config = Config::load_from(path.to_path_buf())
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    if demo {
        config.request.url = DEMO_URL.to_string();
    }
    Ok(config)
}

async fn run_chat(config: Config) -> Result<()> {
    config.validate().context("Configuration is incomplete")?;
    info!(url = %config.request.url, "Starting chat session");

    let mut shell = ChatShell::new(config);
    shell.run().await
}

async fn run_send(config: Config, prompt: String) -> Result<()> {
    config.validate().context("Configuration is incomplete")?;

    if !CompletionsService::<HttpTransport>::can_send_message(&prompt) {
        anyhow::bail!("Prompt is empty");
    }

    let service = CompletionsService::from_config(&config);
    let mut sink = TerminalSink::new();
    let messages = vec![ChatMessage::user(prompt)];

    let interrupts = InterruptGuard::install();

    match tui::send_turn(&service, &messages, &mut sink, &interrupts).await {
        Some(_) => Ok(()),
        None => anyhow::bail!("No reply received"),
    }
}

async fn run_simulate(config: Config, text: &str) -> Result<()> {
    let service = CompletionsService::from_config(&config);
    let mut sink = TerminalSink::new();
    let interrupts = InterruptGuard::install();
    let abort = interrupts.begin_turn();

    let outcome = service.simulate(text, &mut sink, &mut (), &abort).await;
    interrupts.end_turn();

    if let StreamOutcome::Cancelled = outcome? {
        sink.render_system("Simulation stopped.");
    }
    Ok(())
}

fn run_config_command(cmd: ConfigCommands, path: PathBuf) -> Result<()> {
    match cmd {
        ConfigCommands::Init { force } => config_init(path, force)?,
        ConfigCommands::Show => config_show(path)?,
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Validate => config_validate(path)?,
    }
    Ok(())
}

fn config_init(path: PathBuf, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("Configuration file already exists at: {}", path.display());
        println!("Use --force to overwrite");
        return Ok(());
    }

    Config::default().save_to(path.clone())?;

    println!("Configuration file created at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit the config file to add your API key, or");
    println!("  2. Set environment variables:");
    println!("     export OPENAI_API_KEY=your_key");
    println!();
    println!("Set request.url to \"{}\" to try the simulated stream.", DEMO_URL);

    Ok(())
}

fn config_show(path: PathBuf) -> Result<()> {
    let mut config = Config::load_from(path)?;

    // Mask API keys in display
    if config.request.api_key.is_some() {
        config.request.api_key = Some("***".to_string());
    }
    for (name, value) in config.request.headers.iter_mut() {
        if name.eq_ignore_ascii_case("authorization") {
            *value = "***".to_string();
        }
    }

    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn config_validate(path: PathBuf) -> Result<()> {
    let config = Config::load_from(path)?;

    match config.validate() {
        Ok(()) => {
            println!("Configuration is valid.");
            println!("  Endpoint: {}", config.request.url);
            println!("  Model:    {}", config.completions.model);
            println!(
                "  Mode:     {}",
                if config.completions.stream {
                    "streaming"
                } else {
                    "single response"
                }
            );
            Ok(())
        }
        Err(e) => {
            println!("Configuration is invalid: {}", e);
            Err(e.into())
        }
    }
}
