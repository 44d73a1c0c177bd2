//! Line-oriented chat session.

use std::error::Error;
use std::io::{self, Write};

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::build_orchestrator;
use crate::cli::render::stream_reply;
use crate::core::chat_stream::StreamOutcome;
use crate::core::config::data::Config;
use crate::core::error::ChatResult;
use crate::core::orchestrator::ChatOrchestrator;
use crate::utils::logging::TranscriptLog;

const HELP: &str = "\
Commands:
  /regen            Ask for a new answer to the last message
  /clear            Start a new conversation
  /model <name>     Switch model for the next message
  /help             Show this help
  /quit             Leave the session
Ctrl+C stops an answer while it streams.";

/// One line of user input, interpreted.
#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Empty,
    Message(String),
    Regenerate,
    Clear,
    Model(Option<String>),
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    let Some(command) = trimmed.strip_prefix('/') else {
        return Input::Message(trimmed.to_string());
    };

    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name.to_ascii_lowercase().as_str() {
        "regen" | "retry" => Input::Regenerate,
        "clear" => Input::Clear,
        "model" if rest.is_empty() => Input::Model(None),
        "model" => Input::Model(Some(rest.to_string())),
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(name.to_string()),
    }
}

fn prompt() -> io::Result<()> {
    let mut stdout = io::stdout();
    write!(stdout, "> ")?;
    stdout.flush()
}

fn report(result: &ChatResult<StreamOutcome>) {
    if let Err(err) = result {
        eprintln!("❌ Error: {err}");
    }
}

pub async fn run_chat(
    config: &Config,
    transcript: Option<TranscriptLog>,
) -> Result<(), Box<dyn Error>> {
    let (orchestrator, mut events) = build_orchestrator(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!(
        "Connected to {} using {}. Type /help for commands.",
        config.effective_base_url(),
        orchestrator.model()
    );

    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match parse_input(&line) {
            Input::Empty => continue,
            Input::Quit => break,
            Input::Help => println!("{HELP}"),
            Input::Unknown(name) => eprintln!("⚠️  Unknown command: /{name}. Type /help."),
            Input::Model(None) => println!("Current model: {}", orchestrator.model()),
            Input::Model(Some(model)) => {
                orchestrator.set_model(model.as_str());
                println!("Model set to: {model}");
            }
            Input::Clear => {
                orchestrator.clear_messages();
                orchestrator.clear_error();
                if let Some(log) = &transcript {
                    log.note("conversation cleared")?;
                }
                println!("Conversation cleared.");
            }
            Input::Regenerate => {
                let Some(turn_id) = orchestrator.last_assistant_id() else {
                    eprintln!("⚠️  Nothing to regenerate yet.");
                    continue;
                };
                let result = stream_reply(
                    &orchestrator,
                    &mut events,
                    orchestrator.regenerate_response(&turn_id),
                )
                .await?;
                report(&result);
                if let Some(log) = &transcript {
                    log.rewrite(&orchestrator.messages())?;
                }
            }
            Input::Message(text) => {
                let result =
                    stream_reply(&orchestrator, &mut events, orchestrator.send_message(text))
                        .await?;
                report(&result);
                if let Some(log) = &transcript {
                    record_exchange(log, &orchestrator)?;
                }
            }
        }
    }

    Ok(())
}

/// Appends the newest user turn and its answer to the transcript.
fn record_exchange(
    log: &TranscriptLog,
    orchestrator: &ChatOrchestrator,
) -> Result<(), Box<dyn Error>> {
    let turns = orchestrator.messages();
    let start = turns.len().saturating_sub(2);
    for turn in &turns[start..] {
        log.record(turn)?;
    }
    Ok(())
}
