//! Scripted client for driving web-chat REST conversations, built for
//! functional testing and for probing the filtering layers (WAFs, input
//! sanitizers) deployed in front of a chat service.
//!
//! The crate separates three concerns:
//!
//! - [`ChatClient`] owns the lifecycle of one chat session: start, send,
//!   refresh, disconnect, and the auxiliary operations, with a monotonic
//!   transcript cursor and evidence-based block classification.
//! - [`MessageSource`] decides what to say next: a fixed script, the
//!   built-in attack payload tables, a human at a terminal, an external AI
//!   collaborator, or a hybrid of scripted and generated messages.
//! - [`ConversationOrchestrator`] wires the two together, pacing turns,
//!   tallying outcomes, and guaranteeing exactly one disconnect on every
//!   path where a session started.
//!
//! All requests are strictly sequential; there is never more than one in
//! flight. Expected network conditions and per-turn failures are carried as
//! values so a long payload run survives individual hiccups.

pub mod block;
pub mod config;
pub mod error;
pub mod generate;
pub mod observability;
pub mod orchestrator;
pub mod payloads;
pub mod render;
pub mod session;
pub mod source;
pub mod transport;
pub mod types;

pub use block::{BlockEvidence, BlockSignatures};
pub use config::{ProbeArgs, ProbeConfig};
pub use error::{Error, NetworkFailureKind, Result};
pub use generate::{CompletionClient, Generator, GeneratorConfig};
pub use orchestrator::{BlockRecord, ConversationOrchestrator, RunOutcome, RunPolicy, RunReport};
pub use payloads::{PayloadCategory, PayloadSelection};
pub use render::{NullReporter, PlainTextReporter, Reporter};
pub use session::{ChatClient, SessionState, TurnOutcome};
pub use source::{
    GeneratedSource, HybridSource, InteractiveSource, MessageSource, PayloadSource, SourceStep,
    StaticListSource,
};
pub use transport::{HttpTransport, Transport, TransportResult};
pub use types::{ApiError, ChatResponse, EventBody, Participant, TranscriptEvent};
