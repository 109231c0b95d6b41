//! Conversation orchestration.
//!
//! Drives one complete conversation: start the session, pull turns from a
//! [`MessageSource`] one at a time, classify each outcome, and disconnect
//! exactly once on every path that started. Turns are strictly sequential;
//! there is never more than one request in flight.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::block::BlockEvidence;
use crate::error::Error;
use crate::observability;
use crate::render::Reporter;
use crate::session::{ChatClient, TurnOutcome};
use crate::source::{MessageSource, SourceStep};
use crate::transport::Transport;
use crate::types::TranscriptEvent;

/// Pacing and stop conditions for a run.
#[derive(Clone, Debug)]
pub struct RunPolicy {
    /// Pause between turns.
    pub delay: Duration,
    /// Pause after the session starts, before the first turn.
    pub initial_delay: Duration,
    /// End the run at the first blocked message.
    pub stop_on_block: bool,
    /// Message sent with the session start request.
    pub initial_message: Option<String>,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            initial_delay: Duration::ZERO,
            stop_on_block: false,
            initial_message: None,
        }
    }
}

impl RunPolicy {
    /// Sets the pause between turns.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the pause before the first turn.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Ends the run at the first blocked message.
    pub fn stop_on_block(mut self) -> Self {
        self.stop_on_block = true;
        self
    }

    /// Sends `message` with the session start request.
    pub fn with_initial_message(mut self, message: impl Into<String>) -> Self {
        self.initial_message = Some(message.into());
        self
    }
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source had nothing more to say.
    SourceExhausted,
    /// The source itself failed to produce a step.
    SourceFailed,
    /// A message was blocked and the policy stops on blocks.
    StoppedOnBlock,
    /// The session cannot be continued: ended by the server, or client and
    /// server state desynchronized.
    SessionLost,
    /// The cancel flag was raised.
    Cancelled,
    /// The session never started.
    StartFailed,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::SourceExhausted => write!(f, "source exhausted"),
            RunOutcome::SourceFailed => write!(f, "source failed"),
            RunOutcome::StoppedOnBlock => write!(f, "stopped on block"),
            RunOutcome::SessionLost => write!(f, "session lost"),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::StartFailed => write!(f, "start failed"),
        }
    }
}

/// One blocked message and the evidence behind the classification.
#[derive(Clone, Debug)]
pub struct BlockRecord {
    /// The message that was rejected.
    pub message: String,
    /// Why it was classified as blocked.
    pub evidence: BlockEvidence,
}

/// Tally of one complete run.
#[derive(Debug)]
pub struct RunReport {
    /// Message turns attempted.
    pub turns: usize,
    /// Messages the server accepted.
    pub sent: usize,
    /// Messages classified as blocked, with their evidence.
    pub blocked: Vec<BlockRecord>,
    /// Turns that failed without a block classification.
    pub failed_turns: usize,
    /// Why the run ended.
    pub outcome: RunOutcome,
    /// The error that ended the run, when one did.
    pub error: Option<Error>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            turns: 0,
            sent: 0,
            blocked: Vec::new(),
            failed_turns: 0,
            outcome: RunOutcome::SourceExhausted,
            error: None,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} turns: {} sent, {} blocked, {} failed ({})",
            self.turns,
            self.sent,
            self.blocked.len(),
            self.failed_turns,
            self.outcome
        )?;
        if let Some(error) = &self.error {
            write!(f, "; {error}")?;
        }
        for record in &self.blocked {
            write!(f, "\n  blocked: {:?} ({})", record.message, record.evidence)?;
        }
        Ok(())
    }
}

/// Drives one conversation from start to disconnect.
pub struct ConversationOrchestrator<T: Transport> {
    client: ChatClient<T>,
    policy: RunPolicy,
    cancel: Arc<AtomicBool>,
}

impl<T: Transport> ConversationOrchestrator<T> {
    /// Creates an orchestrator over a session client.
    pub fn new(client: ChatClient<T>, policy: RunPolicy) -> Self {
        Self {
            client,
            policy,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the flag that cancels the run when set. Checked between
    /// turns; a turn already in flight completes first.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Runs the conversation to completion.
    ///
    /// Per-turn failures are tallied and the run continues; only a fatal
    /// error, a stop condition, or source exhaustion ends it. Every path on
    /// which the session started ends with exactly one disconnect.
    pub async fn run(
        &mut self,
        source: &mut dyn MessageSource,
        reporter: &mut dyn Reporter,
    ) -> RunReport {
        let mut report = RunReport::new();

        match self.client.start(self.policy.initial_message.as_deref()).await {
            Ok(state) => reporter.session_started(state),
            Err(e) => {
                report.outcome = RunOutcome::StartFailed;
                report.error = Some(e);
                return report;
            }
        }

        if !self.policy.initial_delay.is_zero() {
            tokio::time::sleep(self.policy.initial_delay).await;
        }

        loop {
            if self.cancel.load(Ordering::Relaxed) {
                report.outcome = RunOutcome::Cancelled;
                break;
            }

            let step = match source.next().await {
                Ok(step) => step,
                Err(e) => {
                    report.failed_turns += 1;
                    report.error = Some(e);
                    report.outcome = RunOutcome::SourceFailed;
                    break;
                }
            };

            match step {
                SourceStep::Message(text) => {
                    report.turns += 1;
                    observability::TURNS.click();
                    let turn_started = Instant::now();
                    let ended = self.message_turn(&text, reporter, &mut report).await;
                    observability::TURN_DURATION.add(turn_started.elapsed().as_secs_f64());
                    if ended {
                        break;
                    }
                }
                SourceStep::Refresh => {
                    if self.poll(reporter, &mut report).await {
                        break;
                    }
                }
                SourceStep::End => {
                    report.outcome = RunOutcome::SourceExhausted;
                    break;
                }
            }

            if !self.policy.delay.is_zero() {
                tokio::time::sleep(self.policy.delay).await;
            }
        }

        if let Err(e) = self.client.disconnect().await {
            if report.error.is_none() {
                report.error = Some(e);
            }
        }
        reporter.session_ended();
        report
    }

    /// One send turn plus the follow-up poll. Returns true when the run
    /// should end.
    async fn message_turn(
        &mut self,
        text: &str,
        reporter: &mut dyn Reporter,
        report: &mut RunReport,
    ) -> bool {
        match self.client.send(text).await {
            Ok(TurnOutcome::Sent(events)) => {
                report.sent += 1;
                reporter.message_sent(text);
                if self.deliver(events, reporter) {
                    report.outcome = RunOutcome::SessionLost;
                    return true;
                }
                self.poll(reporter, report).await
            }
            Ok(TurnOutcome::Blocked(evidence)) => {
                reporter.message_blocked(text, &evidence);
                report.blocked.push(BlockRecord {
                    message: text.to_string(),
                    evidence,
                });
                if self.policy.stop_on_block {
                    report.outcome = RunOutcome::StoppedOnBlock;
                    return true;
                }
                false
            }
            Err(e) => self.turn_error(text, e, reporter, report),
        }
    }

    /// One refresh. Returns true when the run should end.
    async fn poll(&mut self, reporter: &mut dyn Reporter, report: &mut RunReport) -> bool {
        match self.client.refresh().await {
            Ok(events) => {
                if self.deliver(events, reporter) {
                    report.outcome = RunOutcome::SessionLost;
                    return true;
                }
                false
            }
            Err(e) => self.turn_error("(refresh)", e, reporter, report),
        }
    }

    /// Reports events; returns true when the server ended the chat.
    fn deliver(&self, events: Vec<TranscriptEvent>, reporter: &mut dyn Reporter) -> bool {
        let mut ended = false;
        for event in &events {
            reporter.transcript_event(event);
            if matches!(event, TranscriptEvent::Disconnect(_)) {
                ended = true;
            }
        }
        ended
    }

    /// Tallies a failed turn. Fatal errors end the run; everything else is
    /// recorded and the conversation continues.
    fn turn_error(
        &self,
        text: &str,
        error: Error,
        reporter: &mut dyn Reporter,
        report: &mut RunReport,
    ) -> bool {
        report.failed_turns += 1;
        observability::FAILED_TURNS.click();
        reporter.turn_failed(text, &error);
        let fatal = error.is_fatal();
        if fatal {
            report.outcome = RunOutcome::SessionLost;
            report.error = Some(error);
        }
        fatal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeConfig;
    use crate::error::Result;
    use crate::generate::Generator;
    use crate::render::NullReporter;
    use crate::session::tests::{started_response, success, MockTransport};
    use crate::source::{GeneratedSource, StaticListSource};
    use crate::transport::TransportResult;

    fn orchestrator(
        script: Vec<TransportResult>,
        policy: RunPolicy,
    ) -> ConversationOrchestrator<MockTransport> {
        let config = ProbeConfig::new("example.com", "svc", "key");
        let client = ChatClient::new(MockTransport::new(script), config);
        ConversationOrchestrator::new(client, policy.with_delay(Duration::ZERO))
    }

    fn urls(orchestrator: &ConversationOrchestrator<MockTransport>) -> Vec<String> {
        orchestrator.client.transport().call_urls()
    }

    struct BrokenSource;

    #[async_trait::async_trait]
    impl crate::source::MessageSource for BrokenSource {
        async fn next(&mut self) -> Result<crate::source::SourceStep> {
            Err(Error::io(
                "script unreadable",
                std::io::Error::other("device gone"),
            ))
        }
    }

    struct EchoGenerator;

    #[async_trait::async_trait]
    impl Generator for EchoGenerator {
        async fn generate(&mut self, prompt: &str) -> Result<String> {
            Ok(format!("re: {prompt}"))
        }

        fn reset(&mut self) {}
    }

    #[tokio::test]
    async fn exhausted_source_sends_refreshes_and_disconnects() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({})),
            ],
            RunPolicy::default(),
        );
        let mut source = StaticListSource::new(vec!["hello".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SourceExhausted);
        assert_eq!(report.turns, 1);
        assert_eq!(report.sent, 1);
        assert!(report.blocked.is_empty());
        assert_eq!(report.failed_turns, 0);

        let urls = urls(&orchestrator);
        assert_eq!(urls.len(), 4);
        assert!(urls[1].ends_with("/send"));
        assert!(urls[2].ends_with("/refresh"));
        assert!(urls[3].ends_with("/disconnect"));
    }

    #[tokio::test]
    async fn stop_on_block_disconnects_exactly_once() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                TransportResult::HttpError {
                    status: 403,
                    body: "Forbidden".to_string(),
                },
                success(serde_json::json!({})),
            ],
            RunPolicy::default().stop_on_block(),
        );
        let mut source =
            StaticListSource::new(vec!["<script>".to_string(), "never sent".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::StoppedOnBlock);
        assert_eq!(report.blocked.len(), 1);
        assert_eq!(report.blocked[0].message, "<script>");
        assert_eq!(report.blocked[0].evidence.status, 403);
        assert_eq!(report.sent, 0);

        let urls = urls(&orchestrator);
        let disconnects = urls.iter().filter(|u| u.ends_with("/disconnect")).count();
        assert_eq!(disconnects, 1);
        assert_eq!(urls.len(), 3);
    }

    #[tokio::test]
    async fn blocks_are_tallied_but_not_fatal_by_default() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                TransportResult::HttpError {
                    status: 403,
                    body: "Forbidden".to_string(),
                },
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({})),
            ],
            RunPolicy::default(),
        );
        let mut source =
            StaticListSource::new(vec!["<script>".to_string(), "hello".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SourceExhausted);
        assert_eq!(report.turns, 2);
        assert_eq!(report.blocked.len(), 1);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn preset_cancel_flag_skips_all_turns() {
        let mut orchestrator = orchestrator(
            vec![started_response(), success(serde_json::json!({}))],
            RunPolicy::default(),
        );
        orchestrator.cancel_flag().store(true, Ordering::Relaxed);
        let mut source = StaticListSource::new(vec!["never sent".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::Cancelled);
        assert_eq!(report.turns, 0);
        let urls = urls(&orchestrator);
        assert_eq!(urls.len(), 2);
        assert!(urls[1].ends_with("/disconnect"));
    }

    #[tokio::test]
    async fn failed_start_makes_no_further_calls() {
        let mut orchestrator = orchestrator(
            vec![TransportResult::HttpError {
                status: 500,
                body: "boom".to_string(),
            }],
            RunPolicy::default(),
        );
        let mut source = StaticListSource::new(vec!["never sent".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::StartFailed);
        assert!(report.error.is_some());
        assert_eq!(urls(&orchestrator).len(), 1);
    }

    #[tokio::test]
    async fn protocol_violation_loses_the_session() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                success(serde_json::json!({"nextPosition": 5})),
                success(serde_json::json!({"nextPosition": 2})),
                success(serde_json::json!({})),
            ],
            RunPolicy::default(),
        );
        let mut source = StaticListSource::new(vec!["one".to_string(), "two".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SessionLost);
        assert_eq!(report.failed_turns, 1);
        assert!(report.error.as_ref().is_some_and(Error::is_fatal));
        assert!(urls(&orchestrator).last().unwrap().ends_with("/disconnect"));
    }

    #[tokio::test]
    async fn network_failures_do_not_end_the_run() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                TransportResult::NetworkFailure {
                    kind: crate::error::NetworkFailureKind::Timeout,
                    message: "deadline exceeded".to_string(),
                },
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({})),
            ],
            RunPolicy::default(),
        );
        let mut source = StaticListSource::new(vec!["one".to_string(), "two".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SourceExhausted);
        assert_eq!(report.failed_turns, 1);
        assert_eq!(report.sent, 1);
    }

    #[tokio::test]
    async fn generated_run_with_three_turns_makes_three_cycles() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({"nextPosition": 1})),
                success(serde_json::json!({"nextPosition": 2})),
                success(serde_json::json!({"nextPosition": 2})),
                success(serde_json::json!({"nextPosition": 3})),
                success(serde_json::json!({"nextPosition": 3})),
                success(serde_json::json!({})),
            ],
            RunPolicy::default(),
        );
        let mut source = GeneratedSource::new(EchoGenerator, vec![], 3);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SourceExhausted);
        assert_eq!(report.turns, 3);
        assert_eq!(report.sent, 3);

        let urls = urls(&orchestrator);
        let sends = urls.iter().filter(|u| u.ends_with("/send")).count();
        let refreshes = urls.iter().filter(|u| u.ends_with("/refresh")).count();
        assert_eq!(sends, 3);
        assert_eq!(refreshes, 3);
    }

    #[tokio::test]
    async fn failing_source_gets_its_own_outcome_and_still_disconnects() {
        let mut orchestrator = orchestrator(
            vec![started_response(), success(serde_json::json!({}))],
            RunPolicy::default(),
        );
        let report = orchestrator.run(&mut BrokenSource, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SourceFailed);
        assert_eq!(report.failed_turns, 1);
        assert!(report.error.is_some());
        let urls = urls(&orchestrator);
        assert_eq!(urls.len(), 2);
        assert!(urls[1].ends_with("/disconnect"));
    }

    #[tokio::test]
    async fn server_disconnect_event_ends_the_run() {
        let mut orchestrator = orchestrator(
            vec![
                started_response(),
                success(serde_json::json!({
                    "nextPosition": 1,
                    "transcript": [{"type": "Disconnect", "index": 0}],
                })),
                success(serde_json::json!({})),
            ],
            RunPolicy::default(),
        );
        let mut source = StaticListSource::new(vec!["one".to_string(), "two".to_string()]);
        let report = orchestrator.run(&mut source, &mut NullReporter).await;

        assert_eq!(report.outcome, RunOutcome::SessionLost);
        assert_eq!(report.sent, 1);
        assert_eq!(urls(&orchestrator).len(), 3);
    }
}
