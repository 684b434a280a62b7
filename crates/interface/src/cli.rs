//! CLI - Command Line Interface
//!
//! Available Commands:
//! - sentinel chat              - Interactive console with command execution
//! - sentinel send -m "message" - One-shot question, streamed to stdout
//! - sentinel config            - Print the effective configuration

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, info};

use sentinel_core::{ChatEvent, SentinelConfig, decode_stream};
use sentinel_runtime::ChatApi;

use crate::console::run_console;
use crate::http::HttpChatApi;

/// CLI Errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CliError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Chat stream ended without a done event")]
    Incomplete,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    /// Answer text and proposals for humans
    Pretty,
    /// One JSON chat event per line
    Json,
}

/// Sentinel security chat client
#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.config/sentinel/config.yaml)
    #[arg(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// Dashboard server URL
    #[arg(long, global = true)]
    pub(crate) url: Option<String>,

    /// API key sent as X-API-Key
    #[arg(long, global = true)]
    pub(crate) api_key: Option<String>,

    /// Verbose logging to stderr
    #[arg(short, long, global = true)]
    pub(crate) verbose: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Interactive console
    Chat(ChatArgs),

    /// Ask one question and print the answer
    Send(SendArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Args, Debug)]
pub(crate) struct ChatArgs {
    /// Start by investigating the flag in this JSON file
    #[arg(long)]
    pub(crate) flag_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct SendArgs {
    /// Message to send
    #[arg(short, long)]
    pub(crate) message: String,

    /// Output format
    #[arg(long, value_enum, default_value = "pretty")]
    pub(crate) output: OutputFormat,
}

impl Cli {
    /// Command line flags win over the file and environment.
    pub(crate) fn apply_overrides(&self, config: &mut SentinelConfig) {
        if let Some(url) = &self.url {
            config.server.base_url = url.trim().to_string();
        }
        if let Some(key) = &self.api_key {
            config.server.api_key = Some(key.trim().to_string());
        }
    }
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut config = SentinelConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);
    config.validate()?;
    debug!(base_url = %config.server.base_url, "configuration loaded");

    match cli.command {
        Commands::Chat(args) => run_console(&config, args.flag_file.as_deref()).await,
        Commands::Send(args) => {
            let api = HttpChatApi::new(&config.server)?;
            let mut stdout = std::io::stdout();
            send_once(&api, &args.message, args.output, &mut stdout).await
        }
        Commands::Config => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

/// Stream one answer to `out`. Proposals are printed, never executed.
pub(crate) async fn send_once(
    api: &dyn ChatApi,
    message: &str,
    format: OutputFormat,
    out: &mut dyn Write,
) -> Result<()> {
    info!("sending one-shot message");
    let body = api.send_chat(message).await?;
    let frames = decode_stream(body);
    futures::pin_mut!(frames);

    let mut finished = false;
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        let event = match ChatEvent::from_frame(&frame) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "skipping frame");
                continue;
            }
        };

        if format == OutputFormat::Json {
            writeln!(out, "{}", serde_json::to_string(&event)?)?;
        }
        match event {
            ChatEvent::Text { content } if format == OutputFormat::Pretty => {
                write!(out, "{}", content)?;
                out.flush()?;
            }
            ChatEvent::Proposal { command, reason } if format == OutputFormat::Pretty => {
                writeln!(out)?;
                if reason.is_empty() {
                    writeln!(out, "Proposed command: {}", command)?;
                } else {
                    writeln!(out, "Proposed command: {} ({})", command, reason)?;
                }
            }
            ChatEvent::Error { message } => return Err(CliError::ServerError(message).into()),
            ChatEvent::Done => {
                finished = true;
                break;
            }
            _ => {}
        }
    }

    if format == OutputFormat::Pretty {
        writeln!(out)?;
    }
    if !finished {
        return Err(CliError::Incomplete.into());
    }
    Ok(())
}
