//! Rendering of conversation progress.
//!
//! The orchestrator reports what happened each turn through the [`Reporter`]
//! trait; this module provides the terminal implementation. Keeping the seam
//! here means orchestration tests can run silently and other front ends can
//! render differently.

use std::io::Write;

use crate::block::BlockEvidence;
use crate::error::Error;
use crate::session::SessionState;
use crate::types::TranscriptEvent;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const GREY: &str = "\x1b[90m";

/// Sink for conversation progress.
pub trait Reporter: Send {
    /// A session became active.
    fn session_started(&mut self, state: &SessionState);

    /// A message was accepted by the server.
    fn message_sent(&mut self, text: &str);

    /// A message was rejected by a filtering layer.
    fn message_blocked(&mut self, text: &str, evidence: &BlockEvidence);

    /// A turn failed without a block classification.
    fn turn_failed(&mut self, text: &str, error: &Error);

    /// A transcript event arrived from the server.
    fn transcript_event(&mut self, event: &TranscriptEvent);

    /// The session was disconnected.
    fn session_ended(&mut self);
}

/// Reporter that ignores everything. Used by tests.
#[derive(Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn session_started(&mut self, _: &SessionState) {}
    fn message_sent(&mut self, _: &str) {}
    fn message_blocked(&mut self, _: &str, _: &BlockEvidence) {}
    fn turn_failed(&mut self, _: &str, _: &Error) {}
    fn transcript_event(&mut self, _: &TranscriptEvent) {}
    fn session_ended(&mut self) {}
}

/// Line-oriented reporter for a terminal.
pub struct PlainTextReporter<W: Write + Send> {
    out: W,
    use_color: bool,
}

impl PlainTextReporter<std::io::Stdout> {
    /// Creates a reporter writing to stdout.
    pub fn stdout(use_color: bool) -> Self {
        Self::new(std::io::stdout(), use_color)
    }
}

impl<W: Write + Send> PlainTextReporter<W> {
    /// Creates a reporter writing to `out`.
    pub fn new(out: W, use_color: bool) -> Self {
        Self { out, use_color }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn line(&mut self, text: String) {
        // A closed pipe should not kill the run.
        let _ = writeln!(self.out, "{text}");
    }

    fn participant(event: &TranscriptEvent) -> String {
        event
            .body()
            .from
            .as_ref()
            .and_then(|from| from.nickname.clone())
            .unwrap_or_else(|| "server".to_string())
    }
}

impl<W: Write + Send> Reporter for PlainTextReporter<W> {
    fn session_started(&mut self, state: &SessionState) {
        let tag = self.paint(GREEN, "session");
        self.line(format!(
            "[{tag}] started chat {} as {}",
            state.chat_id, state.alias
        ));
    }

    fn message_sent(&mut self, text: &str) {
        let tag = self.paint(CYAN, "sent");
        self.line(format!("[{tag}] {text}"));
    }

    fn message_blocked(&mut self, text: &str, evidence: &BlockEvidence) {
        let tag = self.paint(RED, "BLOCKED");
        let bold = self.paint(BOLD, text);
        self.line(format!("[{tag}] {bold}"));
        self.line(format!("          {evidence}"));
    }

    fn turn_failed(&mut self, text: &str, error: &Error) {
        let tag = self.paint(YELLOW, "failed");
        self.line(format!("[{tag}] {text}"));
        self.line(format!("          {error}"));
    }

    fn transcript_event(&mut self, event: &TranscriptEvent) {
        let who = Self::participant(event);
        let text = event.body().text.as_deref();
        let rendered = match event {
            TranscriptEvent::Message(_) => {
                format!("<{who}> {}", text.unwrap_or(""))
            }
            TranscriptEvent::PushUrl(_) => {
                format!("{who} pushed a URL: {}", text.unwrap_or(""))
            }
            TranscriptEvent::ParticipantJoined(_) => format!("{who} joined"),
            TranscriptEvent::ParticipantLeft(_) => format!("{who} left"),
            TranscriptEvent::TypingStarted(_) => format!("{who} is typing..."),
            TranscriptEvent::TypingStopped(_) => format!("{who} stopped typing"),
            TranscriptEvent::CustomNotice(_) => {
                format!("notice from {who}: {}", text.unwrap_or(""))
            }
            TranscriptEvent::Disconnect(_) => "the server ended the chat".to_string(),
            TranscriptEvent::Unknown(body) => {
                format!("unrecognized event at position {}", body.index)
            }
        };
        let painted = self.paint(GREY, &rendered);
        self.line(format!("  {painted}"));
    }

    fn session_ended(&mut self) {
        let tag = self.paint(GREEN, "session");
        self.line(format!("[{tag}] disconnected"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventBody, Participant};

    fn message_event(nickname: &str, text: &str) -> TranscriptEvent {
        TranscriptEvent::Message(EventBody {
            index: 0,
            text: Some(text.to_string()),
            from: Some(Participant {
                nickname: Some(nickname.to_string()),
                participant_id: Some(1),
                kind: Some("Agent".to_string()),
            }),
        })
    }

    fn rendered(use_color: bool, f: impl FnOnce(&mut PlainTextReporter<Vec<u8>>)) -> String {
        let mut reporter = PlainTextReporter::new(Vec::new(), use_color);
        f(&mut reporter);
        String::from_utf8(reporter.out).unwrap()
    }

    #[test]
    fn messages_render_with_the_participant() {
        let out = rendered(false, |r| {
            r.transcript_event(&message_event("Kate", "how can I help?"));
        });
        assert_eq!(out, "  <Kate> how can I help?\n");
    }

    #[test]
    fn colors_are_opt_in() {
        let plain = rendered(false, |r| r.message_sent("hello"));
        let colored = rendered(true, |r| r.message_sent("hello"));
        assert_eq!(plain, "[sent] hello\n");
        assert!(colored.contains("\x1b[36m"));
        assert!(colored.contains("hello"));
    }

    #[test]
    fn blocks_render_with_evidence() {
        let evidence = crate::block::BlockSignatures::default()
            .classify(403, "Forbidden")
            .unwrap();
        let out = rendered(false, |r| {
            r.message_blocked("<script>", &evidence);
        });
        assert!(out.contains("[BLOCKED] <script>"));
        assert!(out.contains("HTTP 403"));
    }

    #[test]
    fn every_event_kind_renders() {
        let body = EventBody {
            index: 3,
            text: None,
            from: None,
        };
        let events = [
            TranscriptEvent::PushUrl(body.clone()),
            TranscriptEvent::ParticipantJoined(body.clone()),
            TranscriptEvent::ParticipantLeft(body.clone()),
            TranscriptEvent::TypingStarted(body.clone()),
            TranscriptEvent::TypingStopped(body.clone()),
            TranscriptEvent::CustomNotice(body.clone()),
            TranscriptEvent::Disconnect(body.clone()),
            TranscriptEvent::Unknown(body),
        ];
        for event in &events {
            let out = rendered(false, |r| r.transcript_event(event));
            assert!(!out.trim().is_empty());
        }
    }
}
