//! Prints a streaming reply to the terminal as the orchestrator applies chunks.

use std::error::Error;
use std::future::Future;
use std::io::{self, Write};

use tokio::sync::mpsc;

use crate::api::Citation;
use crate::core::chat_stream::StreamOutcome;
use crate::core::error::ChatResult;
use crate::core::events::ChatEvent;
use crate::core::message::ChatMessage;
use crate::core::orchestrator::ChatOrchestrator;

/// Tracks how much of the streaming turn has reached the terminal.
#[derive(Debug, Default)]
pub struct ReplyPrinter {
    turn_id: Option<String>,
    printed: usize,
}

impl ReplyPrinter {
    pub fn handle<W: Write>(
        &mut self,
        event: &ChatEvent,
        orchestrator: &ChatOrchestrator,
        out: &mut W,
    ) -> io::Result<()> {
        match event {
            ChatEvent::StreamStarted { turn_id, .. } => {
                self.turn_id = Some(turn_id.clone());
                self.printed = 0;
                Ok(())
            }
            ChatEvent::TurnUpdated { turn_id, .. } if self.is_current(turn_id) => {
                match orchestrator.turn(turn_id) {
                    Some(turn) => self.print_new_text(&turn, out),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    fn is_current(&self, turn_id: &str) -> bool {
        self.turn_id.as_deref() == Some(turn_id)
    }

    fn print_new_text<W: Write>(&mut self, turn: &ChatMessage, out: &mut W) -> io::Result<()> {
        if let Some(new_text) = turn.content.get(self.printed..) {
            if !new_text.is_empty() {
                out.write_all(new_text.as_bytes())?;
                out.flush()?;
            }
        }
        self.printed = turn.content.len();
        Ok(())
    }

    /// Flushes whatever is left of the reply and prints its sources.
    pub fn finish<W: Write>(
        &mut self,
        orchestrator: &ChatOrchestrator,
        out: &mut W,
    ) -> io::Result<()> {
        let Some(turn) = self.turn_id.as_deref().and_then(|id| orchestrator.turn(id)) else {
            return Ok(());
        };
        self.print_new_text(&turn, out)?;
        if self.printed > 0 {
            writeln!(out)?;
        }
        if !turn.annotations.citations.is_empty() {
            writeln!(out, "\nSources:")?;
            for (index, citation) in turn.annotations.citations.iter().enumerate() {
                writeln!(out, "  [{}] {}", index + 1, format_citation(citation))?;
            }
        }
        out.flush()
    }
}

pub fn format_citation(citation: &Citation) -> String {
    let mut text = citation.title.clone().unwrap_or_else(|| citation.source.clone());
    if citation.title.is_some() {
        text.push_str(&format!(" ({})", citation.source));
    }
    if let Some(page) = citation.page {
        text.push_str(&format!(", p. {page}"));
    }
    text
}

/// Drives `request` to completion while echoing the reply to stdout.
///
/// Ctrl+C stops the reply instead of killing the process.
pub async fn stream_reply<F>(
    orchestrator: &ChatOrchestrator,
    events: &mut mpsc::UnboundedReceiver<ChatEvent>,
    request: F,
) -> Result<ChatResult<StreamOutcome>, Box<dyn Error>>
where
    F: Future<Output = ChatResult<StreamOutcome>>,
{
    let mut printer = ReplyPrinter::default();
    let mut stdout = io::stdout();
    tokio::pin!(request);

    let result = loop {
        tokio::select! {
            result = &mut request => break result,
            Some(event) = events.recv() => printer.handle(&event, orchestrator, &mut stdout)?,
            _ = tokio::signal::ctrl_c() => {
                orchestrator.stop_streaming();
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        printer.handle(&event, orchestrator, &mut stdout)?;
    }
    printer.finish(orchestrator, &mut stdout)?;

    if let Ok(StreamOutcome::Stopped) = result {
        eprintln!("⏹  Stopped");
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChunkKind;
    use crate::core::orchestrator::OrchestratorSettings;
    use crate::utils::test_utils::{MockTransport, Reply};
    use std::sync::Arc;

    #[tokio::test]
    async fn printer_writes_each_increment_once() {
        let mock = Arc::new(MockTransport::new());
        mock.push(Reply::chunks(vec![
            ChunkKind::token("Hi"),
            ChunkKind::reasoning("thinking"),
            ChunkKind::token(" there"),
            ChunkKind::Citation {
                citation: Citation {
                    title: Some("FAQ".into()),
                    page: Some(3),
                    ..Citation::new("faq.pdf")
                },
            },
            ChunkKind::Done,
        ]));
        let (chat, mut events) = ChatOrchestrator::new(mock, OrchestratorSettings::new("m"));
        chat.send_message("Hello").await.unwrap();

        let mut printer = ReplyPrinter::default();
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            printer.handle(&event, &chat, &mut out).unwrap();
        }
        printer.finish(&chat, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Hi there\n\nSources:\n  [1] FAQ (faq.pdf), p. 3\n");
    }

    #[test]
    fn citation_without_title_shows_source() {
        assert_eq!(format_citation(&Citation::new("notes.md")), "notes.md");
    }
}
