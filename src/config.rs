//! Configuration for the probe client and CLI.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! [`ProbeConfig`] handed to the transport and session client. The binary
//! validates arguments once; everything downstream receives already-checked
//! values.

use std::time::Duration;

use arrrg_derive::CommandLine;
use url::Url;

use crate::error::{Error, Result};

/// Default per-request timeout, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default path prefix between the host and the service name.
const DEFAULT_BASE_PATH: &str = "genesys/2/chat";

/// Default User-Agent presented to the chat service.
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Gecko/20100101 Firefox/90.0";

/// Command-line arguments for the wafprobe tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ProbeArgs {
    /// Chat server hostname.
    #[arrrg(optional, "Chat server hostname, e.g. gms.example.com", "HOST")]
    pub server: Option<String>,

    /// Service name under the chat path.
    #[arrrg(optional, "Service name, e.g. customer-support", "SERVICE")]
    pub service: Option<String>,

    /// API key; falls back to the WAFPROBE_API_KEY environment variable.
    #[arrrg(optional, "API key (default: WAFPROBE_API_KEY env var)", "KEY")]
    pub api_key: Option<String>,

    /// Operation mode.
    #[arrrg(
        optional,
        "Mode: simple|file|payload|interactive|external|hybrid (default: simple)",
        "MODE"
    )]
    pub mode: Option<String>,

    /// Message file for file and hybrid modes.
    #[arrrg(optional, "Message file, one message per line", "PATH")]
    pub file: Option<String>,

    /// Payload category for payload mode.
    #[arrrg(
        optional,
        "Payload type: xss|sqli|cmdi|path_traversal|xxe|normal|all (default: all)",
        "TYPE"
    )]
    pub payload_type: Option<String>,

    /// Include pre-encoded payload variants.
    #[arrrg(flag, "Also send URL/HTML-entity encoded payload variants")]
    pub encoded: bool,

    /// Delay between messages in seconds.
    #[arrrg(optional, "Delay between messages in seconds (default: 2)", "SECS")]
    pub delay: Option<u64>,

    /// Delay before starting the chat in seconds.
    #[arrrg(optional, "Delay before starting the chat (default: 0)", "SECS")]
    pub initial_delay: Option<u64>,

    /// Initial message sent with session creation.
    #[arrrg(optional, "Initial message sent when starting the chat", "TEXT")]
    pub initial_message: Option<String>,

    /// Stop the run on the first blocked message.
    #[arrrg(flag, "Stop the run when a message is blocked")]
    pub stop_on_block: bool,

    /// Use plain HTTP instead of HTTPS.
    #[arrrg(flag, "Use HTTP instead of HTTPS")]
    pub http: bool,

    /// Skip TLS certificate verification.
    #[arrrg(flag, "Skip TLS certificate verification")]
    pub insecure: bool,

    /// Proxy URL for all requests.
    #[arrrg(optional, "Proxy URL, e.g. http://127.0.0.1:8080", "URL")]
    pub proxy: Option<String>,

    /// User nickname.
    #[arrrg(optional, "User nickname (default: TestUser)", "NAME")]
    pub nickname: Option<String>,

    /// User first name.
    #[arrrg(optional, "User first name (default: Test)", "NAME")]
    pub first_name: Option<String>,

    /// User last name.
    #[arrrg(optional, "User last name (default: User)", "NAME")]
    pub last_name: Option<String>,

    /// User email address.
    #[arrrg(optional, "User email (default: test@example.com)", "EMAIL")]
    pub email: Option<String>,

    /// Chat subject line.
    #[arrrg(optional, "Chat subject (default: Testing)", "SUBJECT")]
    pub subject: Option<String>,

    /// Base URL of the OpenAI-compatible generation endpoint.
    #[arrrg(optional, "Generator base URL for external/hybrid modes", "URL")]
    pub gen_url: Option<String>,

    /// Model name for the generation endpoint.
    #[arrrg(optional, "Generator model name", "MODEL")]
    pub gen_model: Option<String>,

    /// System prompt for the generation endpoint.
    #[arrrg(optional, "Generator system prompt", "PROMPT")]
    pub gen_system: Option<String>,

    /// Maximum generated turns for external mode.
    #[arrrg(optional, "Max turns for external mode (default: 10)", "N")]
    pub max_turns: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Resolved configuration for one probe client.
///
/// Holds everything needed to reach the chat service: endpoint components,
/// the static API key, the identity presented at session creation, and the
/// transport knobs (proxy, TLS verification, timeout).
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    /// Chat server hostname.
    pub server: String,

    /// Service name appended to the base path.
    pub service: String,

    /// Static API key sent as the `apikey` header.
    pub api_key: String,

    /// Path prefix between host and service name.
    pub base_path: String,

    /// Whether to use HTTPS.
    pub use_https: bool,

    /// Whether to verify TLS certificates.
    pub verify_tls: bool,

    /// Optional proxy URL applied to all requests.
    pub proxy: Option<String>,

    /// Per-request timeout.
    pub timeout: Duration,

    /// User-Agent header value.
    pub user_agent: String,

    /// Nickname presented at session creation.
    pub nickname: String,

    /// First name presented at session creation.
    pub first_name: String,

    /// Last name presented at session creation.
    pub last_name: String,

    /// Email address presented at session creation.
    pub email: String,

    /// Subject line presented at session creation.
    pub subject: String,
}

impl ProbeConfig {
    /// Creates a configuration with default identity and transport settings.
    ///
    /// Defaults:
    /// - HTTPS with certificate verification
    /// - 30 second per-request timeout
    /// - identity TestUser / Test User / test@example.com / Testing
    pub fn new(
        server: impl Into<String>,
        service: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            server: server.into(),
            service: service.into(),
            api_key: api_key.into(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            use_https: true,
            verify_tls: true,
            proxy: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            nickname: "TestUser".to_string(),
            first_name: "Test".to_string(),
            last_name: "User".to_string(),
            email: "test@example.com".to_string(),
            subject: "Testing".to_string(),
        }
    }

    /// Sets the path prefix between host and service name.
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    /// Selects plain HTTP instead of HTTPS.
    pub fn with_http(mut self) -> Self {
        self.use_https = false;
        self
    }

    /// Disables TLS certificate verification.
    pub fn without_tls_verification(mut self) -> Self {
        self.verify_tls = false;
        self
    }

    /// Routes all requests through the given proxy.
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the User-Agent header value.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the nickname presented at session creation.
    pub fn with_nickname(mut self, nickname: impl Into<String>) -> Self {
        self.nickname = nickname.into();
        self
    }

    /// Sets the identity presented at session creation.
    pub fn with_identity(
        mut self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self.email = email.into();
        self
    }

    /// Sets the subject line presented at session creation.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Returns the fully resolved endpoint prefix for this service, ending
    /// in a slash. Endpoint templates append `<chat_id>/<operation>`.
    pub fn base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!(
            "{}://{}/{}/{}/",
            scheme,
            self.server,
            self.base_path.trim_matches('/'),
            self.service
        )
    }

    /// Validates that the assembled base URL is absolute and well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.server.is_empty() {
            return Err(Error::validation(
                "server hostname must not be empty",
                Some("server".to_string()),
            ));
        }
        if self.service.is_empty() {
            return Err(Error::validation(
                "service name must not be empty",
                Some("service".to_string()),
            ));
        }
        if self.api_key.is_empty() {
            return Err(Error::validation(
                "API key must not be empty",
                Some("api_key".to_string()),
            ));
        }
        Url::parse(&self.base_url())?;
        if let Some(proxy) = &self.proxy {
            Url::parse(proxy)?;
        }
        Ok(())
    }

    /// Builds a configuration from parsed CLI arguments, reading the API key
    /// from `WAFPROBE_API_KEY` when not given explicitly.
    pub fn from_args(args: &ProbeArgs) -> Result<Self> {
        let server = args.server.clone().ok_or_else(|| {
            Error::validation("server hostname required", Some("server".to_string()))
        })?;
        let service = args.service.clone().ok_or_else(|| {
            Error::validation("service name required", Some("service".to_string()))
        })?;
        let api_key = match args.api_key.clone() {
            Some(key) => key,
            None => std::env::var("WAFPROBE_API_KEY").map_err(|_| {
                Error::validation(
                    "API key not provided and WAFPROBE_API_KEY environment variable not set",
                    Some("api_key".to_string()),
                )
            })?,
        };

        let mut config = ProbeConfig::new(server, service, api_key);
        if args.http {
            config = config.with_http();
        }
        if args.insecure {
            config = config.without_tls_verification();
        }
        if let Some(proxy) = &args.proxy {
            config = config.with_proxy(proxy.clone());
        }
        if let Some(nickname) = &args.nickname {
            config = config.with_nickname(nickname.clone());
        }
        config = config.with_identity(
            args.first_name.clone().unwrap_or_else(|| "Test".to_string()),
            args.last_name.clone().unwrap_or_else(|| "User".to_string()),
            args.email
                .clone()
                .unwrap_or_else(|| "test@example.com".to_string()),
        );
        if let Some(subject) = &args.subject {
            config = config.with_subject(subject.clone());
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ProbeConfig::new("gms.example.com", "support", "key");
        assert!(config.use_https);
        assert!(config.verify_tls);
        assert!(config.proxy.is_none());
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.nickname, "TestUser");
        assert_eq!(
            config.base_url(),
            "https://gms.example.com/genesys/2/chat/support/"
        );
    }

    #[test]
    fn config_builder_pattern() {
        let config = ProbeConfig::new("example.com", "svc", "key")
            .with_http()
            .without_tls_verification()
            .with_proxy("http://127.0.0.1:8080")
            .with_timeout(Duration::from_secs(5))
            .with_nickname("Probe")
            .with_identity("Jo", "Doe", "jo@example.com")
            .with_subject("Smoke test");

        assert!(!config.use_https);
        assert!(!config.verify_tls);
        assert_eq!(config.proxy.as_deref(), Some("http://127.0.0.1:8080"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.base_url(), "http://example.com/genesys/2/chat/svc/");
        assert_eq!(config.nickname, "Probe");
        assert_eq!(config.email, "jo@example.com");
        assert_eq!(config.subject, "Smoke test");
    }

    #[test]
    fn validation_rejects_empty_server() {
        let config = ProbeConfig::new("", "svc", "key");
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn from_args_requires_server() {
        let args = ProbeArgs {
            service: Some("svc".to_string()),
            api_key: Some("key".to_string()),
            ..ProbeArgs::default()
        };
        assert!(ProbeConfig::from_args(&args).is_err());
    }

    #[test]
    fn from_args_resolves_flags() {
        let args = ProbeArgs {
            server: Some("example.com".to_string()),
            service: Some("svc".to_string()),
            api_key: Some("key".to_string()),
            http: true,
            insecure: true,
            nickname: Some("Probe".to_string()),
            ..ProbeArgs::default()
        };
        let config = ProbeConfig::from_args(&args).unwrap();
        assert!(!config.use_https);
        assert!(!config.verify_tls);
        assert_eq!(config.nickname, "Probe");
    }
}
