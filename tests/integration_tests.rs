//! Integration tests against a live chat service.
//! These tests require WAFPROBE_SERVER, WAFPROBE_SERVICE, and
//! WAFPROBE_API_KEY in the environment to run.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wafprobe::{
        ChatClient, ConversationOrchestrator, HttpTransport, NullReporter, PayloadCategory,
        PayloadSelection, PayloadSource, ProbeConfig, RunOutcome, RunPolicy, TurnOutcome,
    };

    fn live_config() -> Option<ProbeConfig> {
        let server = std::env::var("WAFPROBE_SERVER").ok()?;
        let service = std::env::var("WAFPROBE_SERVICE").ok()?;
        let api_key = std::env::var("WAFPROBE_API_KEY").ok()?;
        let mut config = ProbeConfig::new(server, service, api_key)
            .with_timeout(Duration::from_secs(15));
        if std::env::var("WAFPROBE_INSECURE").is_ok() {
            config = config.without_tls_verification();
        }
        Some(config)
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let Some(config) = live_config() else {
            eprintln!("Skipping test: WAFPROBE_SERVER not set");
            return;
        };

        let transport = HttpTransport::new(&config).expect("Failed to build transport");
        let mut client = ChatClient::new(transport, config);

        let state = client
            .start(Some("integration smoke test"))
            .await
            .expect("Session should start with valid credentials");
        assert!(!state.chat_id.is_empty());

        let outcome = client
            .send("Hello, this is an automated check")
            .await
            .expect("Benign message should not fail");
        assert!(
            matches!(outcome, TurnOutcome::Sent(_)),
            "Benign message should not be blocked"
        );

        client.refresh().await.expect("Refresh should succeed");
        client.disconnect().await.expect("Disconnect should succeed");
        assert!(!client.is_active());
    }

    #[tokio::test]
    async fn test_benign_conversation_run() {
        let Some(config) = live_config() else {
            eprintln!("Skipping test: WAFPROBE_SERVER not set");
            return;
        };

        let transport = HttpTransport::new(&config).expect("Failed to build transport");
        let client = ChatClient::new(transport, config);
        let policy = RunPolicy::default().with_delay(Duration::from_millis(500));
        let mut orchestrator = ConversationOrchestrator::new(client, policy);
        let mut source =
            PayloadSource::new(PayloadSelection::Category(PayloadCategory::Normal), false);

        let report = orchestrator.run(&mut source, &mut NullReporter).await;
        assert_eq!(report.outcome, RunOutcome::SourceExhausted);
        assert!(
            report.blocked.is_empty(),
            "Normal traffic should never be blocked"
        );
        assert!(report.sent > 0);
    }
}
