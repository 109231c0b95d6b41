//! HTTP transport for the chat service.
//!
//! The transport issues one signed JSON POST at a time and normalizes
//! expected network conditions into values: timeouts, refused connections,
//! and TLS failures come back as [`TransportResult::NetworkFailure`] rather
//! than propagating, and HTTP statuses >= 400 come back as
//! [`TransportResult::HttpError`] with the raw body preserved. WAF blocks
//! frequently arrive as a non-2xx status with a distinctive body, so the
//! body must survive to the classification layer intact.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client as ReqwestClient;

use crate::config::ProbeConfig;
use crate::error::{Error, NetworkFailureKind, Result};
use crate::observability;

/// The uniform outcome of one transport call.
#[derive(Clone, Debug)]
pub enum TransportResult {
    /// A response with a parseable JSON body.
    Success {
        /// HTTP status code.
        status: u16,
        /// The parsed JSON body.
        body: serde_json::Value,
        /// The raw body text, retained for block-signature matching.
        raw: String,
    },

    /// An HTTP error status, or a 2xx response whose body was not JSON.
    ///
    /// A successful status with a non-JSON body lands here because the chat
    /// protocol is JSON-only; anything else is an interposed error page,
    /// most often a filtering proxy.
    HttpError {
        /// HTTP status code.
        status: u16,
        /// The raw response body.
        body: String,
    },

    /// A network-level failure that produced no HTTP response.
    NetworkFailure {
        /// The failure category.
        kind: NetworkFailureKind,
        /// Human-readable description.
        message: String,
    },
}

/// Capability to perform one signed POST against an absolute URL.
///
/// The session client depends on this seam rather than a concrete HTTP
/// client so that session-lifecycle behavior is testable without a network.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Performs one POST of `body` as JSON against `url`.
    ///
    /// Expected network conditions are returned as values and never raised;
    /// `Err` is reserved for caller mistakes such as a relative URL.
    async fn execute(&self, url: &str, body: &serde_json::Value) -> Result<TransportResult>;
}

/// Reqwest-backed transport carrying proxy, TLS, and timeout configuration.
pub struct HttpTransport {
    client: ReqwestClient,
}

impl HttpTransport {
    /// Builds a transport from the probe configuration.
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let api_key = HeaderValue::from_str(&config.api_key).map_err(|_| {
            Error::validation(
                "API key contains characters not valid in a header",
                Some("api_key".to_string()),
            )
        })?;
        headers.insert("apikey", api_key);

        let mut builder = ReqwestClient::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls);

        if let Some(proxy) = &config.proxy {
            let proxy = reqwest::Proxy::all(proxy).map_err(|e| {
                Error::validation(format!("invalid proxy URL: {e}"), Some("proxy".to_string()))
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::validation(
                format!("failed to build HTTP client: {e}"),
                None,
            )
        })?;

        Ok(Self { client })
    }

    /// Builds a transport with an explicit timeout, for tests and callers
    /// that construct [`ProbeConfig`] elsewhere.
    pub fn with_timeout(config: &ProbeConfig, timeout: Duration) -> Result<Self> {
        let mut config = config.clone();
        config.timeout = timeout;
        Self::new(&config)
    }
}

/// Classifies a reqwest error into a network failure kind.
fn failure_kind(err: &reqwest::Error) -> NetworkFailureKind {
    if err.is_timeout() {
        NetworkFailureKind::Timeout
    } else if err.is_connect() {
        // TLS handshake problems surface as connect errors; distinguish them
        // by the error chain so reports name the real cause.
        let chain = format!("{err:?}");
        if chain.contains("certificate") || chain.contains("Tls") || chain.contains("ssl") {
            NetworkFailureKind::Tls
        } else {
            NetworkFailureKind::Connection
        }
    } else {
        NetworkFailureKind::Other
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, url: &str, body: &serde_json::Value) -> Result<TransportResult> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Error::url(
                format!("transport requires an absolute URL, got {url:?}"),
                None,
            ));
        }

        observability::TRANSPORT_REQUESTS.click();
        let response = match self.client.post(url).json(body).send().await {
            Ok(response) => response,
            Err(e) => {
                observability::TRANSPORT_FAILURES.click();
                return Ok(TransportResult::NetworkFailure {
                    kind: failure_kind(&e),
                    message: e.to_string(),
                });
            }
        };

        let status = response.status().as_u16();
        let raw = match response.text().await {
            Ok(raw) => raw,
            Err(e) => {
                observability::TRANSPORT_FAILURES.click();
                return Ok(TransportResult::NetworkFailure {
                    kind: failure_kind(&e),
                    message: format!("failed to read response body: {e}"),
                });
            }
        };

        if status >= 400 {
            observability::TRANSPORT_HTTP_ERRORS.click();
            return Ok(TransportResult::HttpError { status, body: raw });
        }

        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(body) => Ok(TransportResult::Success { status, body, raw }),
            Err(_) => Ok(TransportResult::HttpError { status, body: raw }),
        }
    }
}
