//! One-shot "say" command

use std::error::Error;

use crate::cli::build_orchestrator;
use crate::cli::render::stream_reply;
use crate::core::config::data::Config;
use crate::utils::logging::TranscriptLog;

pub async fn run_say(
    prompt: Vec<String>,
    config: &Config,
    transcript: Option<TranscriptLog>,
) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: parley say <prompt>");
        std::process::exit(2);
    }

    let (orchestrator, mut events) = build_orchestrator(config)?;
    let result =
        stream_reply(&orchestrator, &mut events, orchestrator.send_message(prompt)).await?;

    if let Some(log) = &transcript {
        for turn in orchestrator.messages() {
            log.record(&turn)?;
        }
    }

    if let Err(err) = result {
        eprintln!("\n❌ Error: {err}");
        std::process::exit(1);
    }
    Ok(())
}
