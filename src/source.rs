//! Conversation sources.
//!
//! A [`MessageSource`] decides what the next turn of a conversation does:
//! send a message, poll for new transcript events, or end the run. The
//! orchestrator is the only consumer; it calls [`next`] once per turn and
//! never looks ahead.
//!
//! [`next`]: MessageSource::next

use std::collections::VecDeque;
use std::path::Path;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::error::{Error, Result};
use crate::generate::Generator;
use crate::payloads::PayloadSelection;

/// What the conversation should do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceStep {
    /// Send this message.
    Message(String),
    /// Poll for transcript events without sending.
    Refresh,
    /// The conversation is over.
    End,
}

/// Supplier of conversation turns.
#[async_trait::async_trait]
pub trait MessageSource: Send {
    /// Produces the next step. After returning [`SourceStep::End`] a source
    /// must keep returning it.
    async fn next(&mut self) -> Result<SourceStep>;
}

/// A fixed, ordered list of messages.
pub struct StaticListSource {
    messages: VecDeque<String>,
}

impl StaticListSource {
    /// Creates a source from messages in order.
    pub fn new(messages: Vec<String>) -> Self {
        Self {
            messages: messages.into(),
        }
    }

    /// Reads one message per line from a file. Blank lines are skipped.
    pub fn from_file(path: &Path) -> Result<Self> {
        Ok(Self::new(read_message_file(path)?))
    }
}

/// Reads one message per line, skipping blank lines.
pub fn read_message_file(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::io(format!("failed to read {}", path.display()), e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

#[async_trait::async_trait]
impl MessageSource for StaticListSource {
    async fn next(&mut self) -> Result<SourceStep> {
        Ok(match self.messages.pop_front() {
            Some(message) => SourceStep::Message(message),
            None => SourceStep::End,
        })
    }
}

/// Attack payloads from the built-in tables, one message each.
pub struct PayloadSource {
    inner: StaticListSource,
}

impl PayloadSource {
    /// Creates a source over the selected categories.
    pub fn new(selection: PayloadSelection, encoded: bool) -> Self {
        Self {
            inner: StaticListSource::new(selection.entries(encoded)),
        }
    }
}

#[async_trait::async_trait]
impl MessageSource for PayloadSource {
    async fn next(&mut self) -> Result<SourceStep> {
        self.inner.next().await
    }
}

/// A human at a terminal.
///
/// Slash commands control the run: `/refresh` polls without sending and
/// `/quit` ends it, as do Ctrl-C and Ctrl-D. An unrecognized command is
/// reported and the prompt re-issued rather than sent to the server.
pub struct InteractiveSource {
    editor: DefaultEditor,
    prompt: String,
}

impl InteractiveSource {
    /// Creates an interactive source reading from the terminal.
    pub fn new() -> Result<Self> {
        let editor = DefaultEditor::new().map_err(|e| {
            Error::io(
                "failed to open terminal",
                std::io::Error::other(e.to_string()),
            )
        })?;
        Ok(Self {
            editor,
            prompt: "you> ".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl MessageSource for InteractiveSource {
    async fn next(&mut self) -> Result<SourceStep> {
        loop {
            match self.editor.readline(&self.prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(command) = line.strip_prefix('/') {
                        match command {
                            "refresh" => return Ok(SourceStep::Refresh),
                            "quit" => return Ok(SourceStep::End),
                            _ => {
                                eprintln!("unknown command: /{command} (try /refresh or /quit)");
                                continue;
                            }
                        }
                    }
                    let _ = self.editor.add_history_entry(line);
                    return Ok(SourceStep::Message(line.to_string()));
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    return Ok(SourceStep::End);
                }
                Err(e) => {
                    return Err(Error::io(
                        "terminal read failed",
                        std::io::Error::other(e.to_string()),
                    ));
                }
            }
        }
    }
}

/// Canned follow-ups used once the seed prompts run out.
const FOLLOW_UPS: &[&str] = &[
    "That didn't quite answer my question, can you explain further?",
    "Is there anything else I should know about this?",
    "How long will that take?",
    "Can you walk me through the steps?",
    "Who should I contact if this happens again?",
];

/// Seed prompts for a generated conversation with no explicit topics.
const DEFAULT_SEEDS: &[&str] = &[
    "I'm having trouble logging into my account.",
    "My last order never arrived.",
    "I was charged twice for the same purchase.",
];

/// An AI collaborator drives the conversation.
///
/// Each turn feeds one prompt to the generator and sends its reply: seed
/// prompts first, then a rotation of canned follow-ups. The run ends after
/// `max_turns` turns, or early if generation fails.
pub struct GeneratedSource<G: Generator> {
    generator: G,
    seeds: VecDeque<String>,
    follow_up: usize,
    max_turns: usize,
    turns: usize,
    /// Set when generation fails; the run ends but the cause is retained.
    pub last_error: Option<Error>,
}

impl<G: Generator> GeneratedSource<G> {
    /// Creates a generated source with explicit seed prompts.
    pub fn new(generator: G, seeds: Vec<String>, max_turns: usize) -> Self {
        let seeds = if seeds.is_empty() {
            DEFAULT_SEEDS.iter().map(|s| s.to_string()).collect()
        } else {
            seeds.into()
        };
        Self {
            generator,
            seeds,
            follow_up: 0,
            max_turns,
            turns: 0,
            last_error: None,
        }
    }

    fn next_prompt(&mut self) -> String {
        if let Some(seed) = self.seeds.pop_front() {
            return seed;
        }
        let prompt = FOLLOW_UPS[self.follow_up % FOLLOW_UPS.len()];
        self.follow_up += 1;
        prompt.to_string()
    }
}

#[async_trait::async_trait]
impl<G: Generator> MessageSource for GeneratedSource<G> {
    async fn next(&mut self) -> Result<SourceStep> {
        if self.turns >= self.max_turns || self.last_error.is_some() {
            return Ok(SourceStep::End);
        }
        let prompt = self.next_prompt();
        match self.generator.generate(&prompt).await {
            Ok(reply) => {
                self.turns += 1;
                Ok(SourceStep::Message(reply))
            }
            Err(e) => {
                self.last_error = Some(e);
                Ok(SourceStep::End)
            }
        }
    }
}

/// Scripted prompts with generated follow-ups.
///
/// Each scripted message is sent verbatim, then the generator produces one
/// reply in the same thread of conversation and that is sent too. Useful for
/// wrapping attack payloads in plausible-looking traffic.
pub struct HybridSource<G: Generator> {
    generator: G,
    scripted: VecDeque<String>,
    pending_follow_up: Option<String>,
    /// Set when generation fails; scripted messages continue without
    /// follow-ups.
    pub last_error: Option<Error>,
}

impl<G: Generator> HybridSource<G> {
    /// Creates a hybrid source from scripted messages.
    pub fn new(generator: G, scripted: Vec<String>) -> Self {
        Self {
            generator,
            scripted: scripted.into(),
            pending_follow_up: None,
            last_error: None,
        }
    }
}

#[async_trait::async_trait]
impl<G: Generator> MessageSource for HybridSource<G> {
    async fn next(&mut self) -> Result<SourceStep> {
        if let Some(prompt) = self.pending_follow_up.take() {
            match self.generator.generate(&prompt).await {
                Ok(reply) => return Ok(SourceStep::Message(reply)),
                Err(e) => {
                    self.last_error = Some(e);
                }
            }
        }
        Ok(match self.scripted.pop_front() {
            Some(message) => {
                if self.last_error.is_none() {
                    self.pending_follow_up = Some(format!(
                        "You just told the support agent: {message:?}. Write your next message \
                         continuing the conversation."
                    ));
                }
                SourceStep::Message(message)
            }
            None => SourceStep::End,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::PayloadCategory;

    struct ScriptedGenerator {
        replies: VecDeque<Result<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Result<String>>) -> Self {
            Self {
                replies: replies.into(),
            }
        }
    }

    #[async_trait::async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&mut self, _prompt: &str) -> Result<String> {
            self.replies
                .pop_front()
                .unwrap_or_else(|| Ok("another reply".to_string()))
        }

        fn reset(&mut self) {}
    }

    #[tokio::test]
    async fn static_source_emits_in_order_then_ends() {
        let mut source = StaticListSource::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(source.next().await.unwrap(), SourceStep::Message("a".to_string()));
        assert_eq!(source.next().await.unwrap(), SourceStep::Message("b".to_string()));
        assert_eq!(source.next().await.unwrap(), SourceStep::End);
        assert_eq!(source.next().await.unwrap(), SourceStep::End);
    }

    #[tokio::test]
    async fn payload_source_covers_the_selection() {
        let mut source = PayloadSource::new(
            PayloadSelection::Category(PayloadCategory::Xxe),
            false,
        );
        let mut count = 0;
        while source.next().await.unwrap() != SourceStep::End {
            count += 1;
        }
        assert_eq!(count, PayloadCategory::Xxe.table().len());
    }

    #[tokio::test]
    async fn generated_source_honors_max_turns() {
        let generator = ScriptedGenerator::new(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
            Ok("three".to_string()),
            Ok("four".to_string()),
        ]);
        let mut source = GeneratedSource::new(generator, vec![], 3);
        let mut sent = 0;
        while let SourceStep::Message(_) = source.next().await.unwrap() {
            sent += 1;
        }
        assert_eq!(sent, 3);
        assert!(source.last_error.is_none());
    }

    #[tokio::test]
    async fn generated_source_ends_on_generation_failure() {
        let generator = ScriptedGenerator::new(vec![
            Ok("one".to_string()),
            Err(Error::generation("model unavailable")),
        ]);
        let mut source = GeneratedSource::new(generator, vec![], 10);
        assert!(matches!(
            source.next().await.unwrap(),
            SourceStep::Message(_)
        ));
        assert_eq!(source.next().await.unwrap(), SourceStep::End);
        assert!(source.last_error.is_some());
        assert_eq!(source.next().await.unwrap(), SourceStep::End);
    }

    #[tokio::test]
    async fn hybrid_interleaves_scripted_and_generated() {
        let generator = ScriptedGenerator::new(vec![
            Ok("generated A".to_string()),
            Ok("generated B".to_string()),
        ]);
        let mut source = HybridSource::new(
            generator,
            vec!["scripted 1".to_string(), "scripted 2".to_string()],
        );
        assert_eq!(
            source.next().await.unwrap(),
            SourceStep::Message("scripted 1".to_string())
        );
        assert_eq!(
            source.next().await.unwrap(),
            SourceStep::Message("generated A".to_string())
        );
        assert_eq!(
            source.next().await.unwrap(),
            SourceStep::Message("scripted 2".to_string())
        );
        assert_eq!(
            source.next().await.unwrap(),
            SourceStep::Message("generated B".to_string())
        );
        assert_eq!(source.next().await.unwrap(), SourceStep::End);
    }

    #[tokio::test]
    async fn hybrid_continues_scripted_when_generation_fails() {
        let generator =
            ScriptedGenerator::new(vec![Err(Error::generation("model unavailable"))]);
        let mut source = HybridSource::new(
            generator,
            vec!["scripted 1".to_string(), "scripted 2".to_string()],
        );
        assert_eq!(
            source.next().await.unwrap(),
            SourceStep::Message("scripted 1".to_string())
        );
        assert_eq!(
            source.next().await.unwrap(),
            SourceStep::Message("scripted 2".to_string())
        );
        assert_eq!(source.next().await.unwrap(), SourceStep::End);
        assert!(source.last_error.is_some());
    }
}
