//! Transport abstraction for talking to the search service.
//!
//! The search client only needs "send a GET with these headers, give me the
//! status and body". Keeping that behind a trait enables:
//!
//! - Unit tests against a scripted transport (no network)
//! - HTTP-level tests with `wiremock` against [`HttpTransport`]
//! - Swapping the HTTP stack without touching request construction

use async_trait::async_trait;
use reqwest::Method;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

/// One request as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: Method,
    /// Scheme and host, e.g. `https://apiservices.infogroup.com`.
    pub base_url: String,
    /// Path plus encoded query string.
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
}

impl TransportRequest {
    #[must_use]
    pub fn get(base_url: impl Into<String>, path_and_query: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            base_url: base_url.into(),
            path_and_query: path_and_query.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Path without the query string. Safe to log: the API key travels in
    /// the query.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map_or(self.path_and_query.as_str(), |(path, _)| path)
    }

    /// Value of a header, matched case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a completed exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Errors raised below the HTTP status level.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connect, TLS, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No connection could be made for another reason
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Sends requests to the search service.
///
/// Implementations own connection management, TLS, and timeouts; callers
/// impose no deadline of their own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// reqwest-based transport.
///
/// The underlying client is built on first use and reused for every later
/// request made through this transport.
#[derive(Debug, Default)]
pub struct HttpTransport {
    client: OnceCell<reqwest::Client>,
    timeout: Option<Duration>,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose requests fail once `timeout` elapses.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: OnceCell::new(),
            timeout: Some(timeout),
        }
    }

    /// Transport around an existing `reqwest::Client` (for custom TLS or proxies).
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: OnceCell::new_with(Some(client)),
            timeout: None,
        }
    }

    async fn client(&self) -> Result<&reqwest::Client, TransportError> {
        self.client
            .get_or_try_init(|| async {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build().map_err(TransportError::from)
            })
            .await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let client = self.client().await?;
        let url = format!("{}{}", request.base_url, request.path_and_query);

        let mut builder = client.request(request.method, &url);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await.map_err(redact)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(redact)?;

        Ok(TransportResponse { status, body })
    }
}

/// Drop the URL from a reqwest error: it carries the API key or, for the
/// authenticate call, the account password.
fn redact(err: reqwest::Error) -> TransportError {
    TransportError::Request(err.without_url())
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::missing_const_for_fn,
    clippy::must_use_candidate
)]
pub mod mock {
    //! Scripted transport for unit testing.

    use super::{Transport, TransportError, TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Transport that replays queued responses in order.
    ///
    /// Queue responses with `push_*` and inspect what was sent with
    /// `requests()`. An exhausted script yields `TransportError::Unavailable`.
    pub struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        /// Queue a response with the given status and body.
        pub fn push_response(&self, status: u16, body: impl Into<String>) -> &Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(TransportResponse::new(status, body)));
            self
        }

        /// Queue a 200 response carrying `value` as JSON.
        pub fn push_json(&self, value: &serde_json::Value) -> &Self {
            self.push_response(200, value.to_string())
        }

        /// Queue a transport-level failure.
        pub fn push_error(&self, error: TransportError) -> &Self {
            self.responses.lock().unwrap().push_back(Err(error));
            self
        }

        /// Every request sent so far, in order.
        pub fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().unwrap().clone()
        }

        /// Number of requests sent so far.
        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Default for ScriptedTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(
            &self,
            request: TransportRequest,
        ) -> Result<TransportResponse, TransportError> {
            self.requests.lock().unwrap().push(request);

            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| {
                    Err(TransportError::Unavailable(
                        "no scripted response left".to_string(),
                    ))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_strips_query() {
        let request = TransportRequest::get("https://h", "/searchapi/usbusiness/?apikey=secret");
        assert_eq!(request.path(), "/searchapi/usbusiness/");
        let bare = TransportRequest::get("https://h", "/searchapi/authenticate");
        assert_eq!(bare.path(), "/searchapi/authenticate");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = TransportRequest::get("https://h", "/").with_headers(vec![(
            "Accept".to_string(),
            "application/json".to_string(),
        )]);
        assert_eq!(request.header("accept"), Some("application/json"));
        assert_eq!(request.header("User-Agent"), None);
    }

    #[tokio::test]
    async fn scripted_transport_replays_in_order() {
        let transport = mock::ScriptedTransport::new();
        transport.push_response(401, "").push_response(200, "{}");

        let first = transport
            .send(TransportRequest::get("https://h", "/a"))
            .await
            .unwrap();
        let second = transport
            .send(TransportRequest::get("https://h", "/b"))
            .await
            .unwrap();
        let third = transport.send(TransportRequest::get("https://h", "/c")).await;

        assert_eq!(first.status, 401);
        assert_eq!(second.status, 200);
        assert!(matches!(third, Err(TransportError::Unavailable(_))));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.requests()[1].path(), "/b");
    }
}
