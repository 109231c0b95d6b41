//! Chat session lifecycle and messaging.
//!
//! [`ChatClient`] owns the state of at most one open conversation and is the
//! only place that state is mutated. Every operation other than [`start`]
//! requires an active session and performs exactly one transport call; all
//! per-turn failures come back as values so a multi-turn test run can decide
//! whether to continue.
//!
//! [`start`]: ChatClient::start

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::block::{BlockEvidence, BlockSignatures};
use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::observability;
use crate::transport::{Transport, TransportResult};
use crate::types::{ChatResponse, TranscriptEvent};

/// The authoritative in-memory record of one open chat conversation.
///
/// Owned exclusively by [`ChatClient`]; all fields except
/// `transcript_position` are immutable after creation, and the cursor only
/// ever moves forward.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    /// Opaque server-issued conversation identifier.
    pub chat_id: String,
    /// Opaque server-issued credential required on every subsequent call.
    pub secure_key: String,
    /// Server-issued participant identifier.
    pub user_id: String,
    /// Server-issued participant alias.
    pub alias: String,
    /// Monotonically non-decreasing cursor into the server transcript.
    pub transcript_position: u64,
    /// Fully resolved endpoint prefix for this session.
    pub base_url: String,
}

/// The classified outcome of one sent message.
#[derive(Clone, Debug)]
pub enum TurnOutcome {
    /// The message was accepted; carries transcript events at or past the
    /// cursor position before the send.
    Sent(Vec<TranscriptEvent>),
    /// The message was rejected by a filtering layer.
    Blocked(BlockEvidence),
}

/// Client for one chat conversation against the remote service.
///
/// Exactly one session may be active per client at a time. A second
/// [`start`] while active fails with [`Error::AlreadyActive`]; operations
/// without an active session fail with [`Error::NotActive`] before touching
/// the transport.
///
/// [`start`]: ChatClient::start
pub struct ChatClient<T: Transport> {
    transport: T,
    config: ProbeConfig,
    signatures: BlockSignatures,
    session: Option<SessionState>,
}

impl<T: Transport> ChatClient<T> {
    /// Creates a client with the default block signatures.
    pub fn new(transport: T, config: ProbeConfig) -> Self {
        Self {
            transport,
            config,
            signatures: BlockSignatures::default(),
            session: None,
        }
    }

    /// Replaces the block-detection signatures.
    ///
    /// The marker set is a heuristic, not a contract; deployments behind a
    /// specific appliance should supply their own.
    pub fn with_signatures(mut self, signatures: BlockSignatures) -> Self {
        self.signatures = signatures;
        self
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns true while a session is active.
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Returns the active session state, if any.
    pub fn session(&self) -> Option<&SessionState> {
        self.session.as_ref()
    }

    /// Starts a new chat session, optionally sending an initial message.
    ///
    /// On success the session becomes active and its state is returned. At
    /// most one `start` may succeed per client lifetime unless the session
    /// is disconnected first.
    pub async fn start(&mut self, initial_text: Option<&str>) -> Result<&SessionState> {
        if self.session.is_some() {
            return Err(Error::AlreadyActive);
        }

        let base_url = self.config.base_url();
        let body = json!({
            "data": {
                "nickname": self.config.nickname,
                "firstName": self.config.first_name,
                "lastName": self.config.last_name,
                "emailAddress": self.config.email,
                "subject": self.config.subject,
            },
            "text": initial_text.unwrap_or(""),
        });

        let response = match self.transport.execute(&base_url, &body).await? {
            TransportResult::Success { body, .. } => ChatResponse::from_value(body)?,
            TransportResult::HttpError { status, body } => {
                return Err(Error::server(status, truncate(&body)));
            }
            TransportResult::NetworkFailure { kind, message } => {
                return Err(Error::network(kind, message));
            }
        };

        if let Some(err) = response.server_error() {
            return Err(err);
        }

        let state = SessionState {
            chat_id: ChatResponse::require("chatId", &response.chat_id)?.to_string(),
            secure_key: ChatResponse::require("secureKey", &response.secure_key)?.to_string(),
            user_id: ChatResponse::require("userId", &response.user_id)?.to_string(),
            alias: ChatResponse::require("alias", &response.alias)?.to_string(),
            transcript_position: response.next_position.unwrap_or(0),
            base_url,
        };

        observability::SESSIONS_STARTED.click();
        Ok(self.session.insert(state))
    }

    /// Sends a message and classifies the outcome.
    ///
    /// Classification is evidence-based: the configured block signatures are
    /// applied to every response, whether the transport reported it as an
    /// HTTP error or as a success with an error payload. On `Sent`, the
    /// cursor advances and events at or past the previous cursor are
    /// returned.
    pub async fn send(&mut self, text: &str) -> Result<TurnOutcome> {
        let (url, body) = self.operation_request("send", json!({ "text": text }))?;

        match self.transport.execute(&url, &body).await? {
            TransportResult::Success { status, body, raw } => {
                if let Some(evidence) = self.signatures.classify(status, &raw) {
                    observability::MESSAGES_BLOCKED.click();
                    return Ok(TurnOutcome::Blocked(evidence));
                }
                let events = self.ingest(ChatResponse::from_value(body)?)?;
                observability::MESSAGES_SENT.click();
                Ok(TurnOutcome::Sent(events))
            }
            TransportResult::HttpError { status, body } => {
                if let Some(evidence) = self.signatures.classify(status, &body) {
                    observability::MESSAGES_BLOCKED.click();
                    return Ok(TurnOutcome::Blocked(evidence));
                }
                Err(Error::server(status, truncate(&body)))
            }
            TransportResult::NetworkFailure { kind, message } => {
                Err(Error::network(kind, message))
            }
        }
    }

    /// Polls for transcript events past the cursor without sending anything.
    pub async fn refresh(&mut self) -> Result<Vec<TranscriptEvent>> {
        let (url, body) = self.operation_request("refresh", json!({}))?;
        let response = self.dispatch(&url, &body).await?;
        observability::REFRESHES.click();
        self.ingest(response)
    }

    /// Disconnects from the session.
    ///
    /// Best-effort and idempotent: the local session is cleared even when
    /// the remote call fails, and calling this without an active session is
    /// a no-op success.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        observability::SESSIONS_DISCONNECTED.click();

        let url = format!("{}{}/disconnect", session.base_url, session.chat_id);
        let body = Self::body_for(&session, json!({}));
        match self.transport.execute(&url, &body).await? {
            TransportResult::Success { .. } => Ok(()),
            TransportResult::HttpError { status, body } => {
                Err(Error::server(status, truncate(&body)))
            }
            TransportResult::NetworkFailure { kind, message } => {
                Err(Error::network(kind, message))
            }
        }
    }

    /// Signals that the user started typing.
    pub async fn start_typing(&mut self) -> Result<()> {
        self.simple_op("startTyping", json!({})).await
    }

    /// Signals that the user stopped typing.
    pub async fn stop_typing(&mut self) -> Result<()> {
        self.simple_op("stopTyping", json!({})).await
    }

    /// Updates the user's nickname.
    pub async fn update_nickname(&mut self, nickname: &str) -> Result<()> {
        self.simple_op("updateNickname", json!({ "nickname": nickname }))
            .await
    }

    /// Updates arbitrary user data attached to the session.
    pub async fn update_user_data(
        &mut self,
        user_data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<()> {
        self.simple_op("updateData", json!({ "userData": user_data }))
            .await
    }

    /// Sends an application-defined notice.
    pub async fn send_custom_notice(&mut self, text: &str) -> Result<()> {
        self.simple_op("customNotice", json!({ "text": text })).await
    }

    /// Sets or replaces the push notification URL for the session.
    pub async fn set_push_url(&mut self, push_url: &str) -> Result<()> {
        self.simple_op("pushUrl", json!({ "pushUrl": push_url })).await
    }

    /// Acknowledges that the transcript has been read up to `position`.
    pub async fn send_read_receipt(&mut self, position: u64) -> Result<()> {
        self.simple_op("readReceipt", json!({ "transcriptPosition": position }))
            .await
    }

    /// Uploads a file, base64-encoding its content into the request body.
    pub async fn upload_file(&mut self, path: &std::path::Path) -> Result<()> {
        let content = std::fs::read(path)
            .map_err(|e| Error::io(format!("failed to read {}: {e}", path.display()), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.simple_op(
            "file",
            json!({
                "file": {
                    "name": name,
                    "content": BASE64.encode(content),
                }
            }),
        )
        .await
    }

    /// One auxiliary operation: active-session check, one transport call,
    /// cursor kept current when the response reports a new position.
    async fn simple_op(&mut self, endpoint: &str, extra: serde_json::Value) -> Result<()> {
        let (url, body) = self.operation_request(endpoint, extra)?;
        let response = self.dispatch(&url, &body).await?;
        self.ingest(response)?;
        Ok(())
    }

    /// Builds the URL and signed body for an operation on the active session.
    fn operation_request(
        &self,
        endpoint: &str,
        extra: serde_json::Value,
    ) -> Result<(String, serde_json::Value)> {
        let session = self.session.as_ref().ok_or(Error::NotActive)?;
        let url = format!("{}{}/{}", session.base_url, session.chat_id, endpoint);
        Ok((url, Self::body_for(session, extra)))
    }

    /// The common request body: session credentials plus the cursor, merged
    /// with operation-specific fields.
    fn body_for(session: &SessionState, extra: serde_json::Value) -> serde_json::Value {
        let mut body = json!({
            "data": {
                "alias": session.alias,
                "secureKey": session.secure_key,
                "userId": session.user_id,
                "transcriptPosition": session.transcript_position,
            }
        });
        if let (Some(body), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
            for (key, value) in extra {
                body.insert(key.clone(), value.clone());
            }
        }
        body
    }

    /// Executes one call and maps non-success transports to errors.
    async fn dispatch(&self, url: &str, body: &serde_json::Value) -> Result<ChatResponse> {
        match self.transport.execute(url, body).await? {
            TransportResult::Success { body, .. } => {
                let response = ChatResponse::from_value(body)?;
                match response.server_error() {
                    Some(err) => Err(err),
                    None => Ok(response),
                }
            }
            TransportResult::HttpError { status, body } => {
                Err(Error::server(status, truncate(&body)))
            }
            TransportResult::NetworkFailure { kind, message } => {
                Err(Error::network(kind, message))
            }
        }
    }

    /// Advances the cursor from a response and surfaces fresh events.
    ///
    /// A response that omits `nextPosition` retains the prior cursor. A
    /// reported position below the current cursor is a protocol violation:
    /// the cursor does not regress and the session cannot be safely
    /// continued. Events already below the prior cursor are dropped rather
    /// than re-delivered.
    fn ingest(&mut self, response: ChatResponse) -> Result<Vec<TranscriptEvent>> {
        if let Some(err) = response.server_error() {
            return Err(err);
        }
        let session = self.session.as_mut().ok_or(Error::NotActive)?;
        let previous = session.transcript_position;
        if let Some(next) = response.next_position {
            if next < previous {
                return Err(Error::protocol(format!(
                    "transcript cursor moved backwards: {next} < {previous}"
                )));
            }
            session.transcript_position = next;
        }
        Ok(response
            .transcript
            .into_iter()
            .filter(|event| event.index() >= previous)
            .collect())
    }
}

/// Bounds server error bodies carried inside error messages.
fn truncate(body: &str) -> String {
    let mut message = body.to_string();
    if message.len() > 200 {
        let mut cut = 200;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}
