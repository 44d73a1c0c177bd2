//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod chat;
pub mod render;
pub mod say;
pub mod settings;

use std::error::Error;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use crate::cli::chat::run_chat;
use crate::cli::say::run_say;
use crate::cli::settings::{apply_set, apply_unset};
use crate::core::config::data::{path_display, Config};
use crate::core::events::ChatEvent;
use crate::core::http_transport::HttpTransport;
use crate::core::orchestrator::ChatOrchestrator;
use crate::utils::logging::{init_tracing, TranscriptLog};

#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Chat with a document-grounded answering service from the terminal")]
#[command(
    long_about = "Parley sends your messages to a retrieval-augmented answering service and \
prints each reply as it streams in, followed by the documents it cites.\n\n\
Configuration:\n\
  Settings live in config.toml under the platform config directory, or under\n\
  $PARLEY_CONFIG_DIR when set. Use 'parley set' and 'parley unset' to edit them.\n\n\
Environment Variables:\n\
  PARLEY_CONFIG_DIR   Directory holding config.toml\n\
  PARLEY_LOG          Diagnostics filter written to stderr (e.g. debug, parley=trace)\n\n\
Chat commands:\n\
  /regen            Ask for a new answer to the last message\n\
  /clear            Start a new conversation\n\
  /model <name>     Switch model\n\
  /quit             Leave the session\n\
  Ctrl+C            Stop the answer that is streaming"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to answer with (overrides default-model)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Root URL of the answering service (overrides base-url)
    #[arg(short = 'u', long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Data source to search; repeat for several (overrides data-sources)
    #[arg(short = 's', long = "source", global = true, value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Append the conversation transcript to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat session (default)
    Chat,
    /// Send a single message and print the streamed answer
    Say {
        /// Message to send (joined with spaces)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// Print the effective configuration
    Config,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: String,
        /// Value to set for the key (data-sources accepts several)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Vec<String>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let stored = Config::load()?;

    match args.command.clone().unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            let mut config = stored;
            match apply_set(&mut config, &key, &value) {
                Ok(message) => {
                    config.save()?;
                    println!("{message}");
                    Ok(())
                }
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            }
        }
        Commands::Unset { key } => {
            let mut config = stored;
            match apply_unset(&mut config, &key) {
                Ok(message) => {
                    config.save()?;
                    println!("{message}");
                    Ok(())
                }
                Err(err) => {
                    err.print();
                    std::process::exit(1);
                }
            }
        }
        Commands::Config => {
            if let Ok(path) = Config::config_path() {
                println!("Config file: {}", path_display(path));
            }
            apply_overrides(stored, &args).print_all();
            Ok(())
        }
        Commands::Say { prompt } => {
            let config = apply_overrides(stored, &args);
            let transcript = open_transcript(&args)?;
            run_say(prompt, &config, transcript).await
        }
        Commands::Chat => {
            let config = apply_overrides(stored, &args);
            let transcript = open_transcript(&args)?;
            run_chat(&config, transcript).await
        }
    }
}

/// Command-line flags win over values from the config file.
pub fn apply_overrides(mut config: Config, args: &Args) -> Config {
    if let Some(model) = args.model.as_deref().filter(|m| !m.trim().is_empty()) {
        config.default_model = Some(model.trim().to_string());
    }
    if let Some(url) = args.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        config.base_url = Some(url.trim().to_string());
    }
    if !args.sources.is_empty() {
        config.data_sources = args.sources.clone();
    }
    config
}

fn open_transcript(args: &Args) -> Result<Option<TranscriptLog>, Box<dyn Error>> {
    match args.log.as_deref() {
        Some(path) => Ok(Some(TranscriptLog::open(path)?)),
        None => Ok(None),
    }
}

/// Builds an orchestrator that talks HTTP to the configured service.
pub(crate) fn build_orchestrator(
    config: &Config,
) -> Result<(ChatOrchestrator, mpsc::UnboundedReceiver<ChatEvent>), Box<dyn Error>> {
    let transport = HttpTransport::new(
        config.effective_base_url(),
        config.effective_connect_timeout(),
        config.native_regenerate_enabled(),
    )?;
    Ok(ChatOrchestrator::new(
        Arc::new(transport),
        config.orchestrator_settings(),
    ))
}
