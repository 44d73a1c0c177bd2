//! Diagnostics output and conversation transcripts.

use crate::core::message::{ChatMessage, Role, TurnStatus};
use std::error::Error;
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing_subscriber::EnvFilter;

pub const LOG_FILTER_ENV: &str = "PARLEY_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";
const USER_PREFIX: &str = "You";

/// Installs the stderr `tracing` subscriber, filtered by `PARLEY_LOG`.
///
/// Diagnostics go to stderr so they never interleave with streamed replies on
/// stdout. Calling this twice leaves the first subscriber in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Plain-text copy of the conversation, kept in step with the log.
pub struct TranscriptLog {
    path: PathBuf,
}

impl TranscriptLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Box<dyn Error>> {
        let path = path.into();
        // Fail now rather than on the first reply.
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.flush()?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, turn: &ChatMessage) -> Result<(), Box<dyn Error>> {
        match format_turn(turn) {
            Some(text) => self.append(&text),
            None => Ok(()),
        }
    }

    /// Writes an out-of-band line such as "conversation cleared".
    pub fn note(&self, text: &str) -> Result<(), Box<dyn Error>> {
        self.append(&format!("## {text}"))
    }

    /// Replaces the transcript with `turns`, atomically.
    pub fn rewrite(&self, turns: &[ChatMessage]) -> Result<(), Box<dyn Error>> {
        let parent = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp_file = NamedTempFile::new_in(parent)?;

        for text in turns.iter().filter_map(format_turn) {
            write_block(&mut temp_file, &text)?;
        }

        temp_file.flush()?;
        temp_file.as_file().sync_all()?;
        temp_file.persist(&self.path)?;
        Ok(())
    }

    fn append(&self, text: &str) -> Result<(), Box<dyn Error>> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        write_block(&mut writer, text)?;
        writer.flush()?;
        Ok(())
    }
}

fn write_block(writer: &mut impl Write, text: &str) -> std::io::Result<()> {
    for line in text.lines() {
        writeln!(writer, "{line}")?;
    }
    // Blank line between turns, as on screen.
    writeln!(writer)
}

fn format_turn(turn: &ChatMessage) -> Option<String> {
    match turn.role {
        Role::User => Some(format!("{USER_PREFIX}: {}", turn.content)),
        Role::Assistant if turn.content.is_empty() => None,
        Role::Assistant => match turn.status {
            TurnStatus::Stopped => Some(format!("{}\n## stopped", turn.content)),
            TurnStatus::Error => Some(format!("{}\n## failed", turn.content)),
            TurnStatus::Streaming | TurnStatus::Completed => Some(turn.content.clone()),
        },
        Role::System => None,
    }
}
