//! HTTP mock server helpers for testing the search client.
//!
//! A thin wrapper around `wiremock` for declarative stubbing of GET
//! endpoints.
//!
//! # Quick Start
//!
//! ```ignore
//! use crate::common::http_mock::MockHttpServer;
//!
//! #[tokio::test]
//! async fn counts() {
//!     let server = MockHttpServer::start().await;
//!
//!     server
//!         .expect_get("/searchapi/usbusiness/counts")
//!         .with_query_param("apikey", "k")
//!         .respond_with_json(json!({"MatchCount": 3}))
//!         .mount()
//!         .await;
//!
//!     // Point the client at server.url()
//! }
//! ```
//!
//! # Patterns
//!
//! - **Success response**: `.respond_with_json(value)` or `.respond_with_body(string)`
//! - **Error response**: `.respond_with_status(401)`
//! - **Request verification**: `.expect_times(1)` to assert call count

#![allow(dead_code)]

pub use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
pub use wiremock::MockServer as WiremockServer;
pub use wiremock::{Mock, ResponseTemplate};

use serde_json::Value;
use wiremock::MockBuilder;

/// A running stub server.
pub struct MockHttpServer {
    server: WiremockServer,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        Self {
            server: WiremockServer::start().await,
        }
    }

    /// Base URL of the server, without a trailing slash.
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Start a stub for `GET {path}`.
    pub fn expect_get(&self, route: &str) -> StubBuilder<'_> {
        StubBuilder {
            server: &self.server,
            mock: Mock::given(method("GET")).and(path(route)),
            response: ResponseTemplate::new(200),
            times: None,
        }
    }

    /// Every request received so far.
    pub async fn received(&self) -> Vec<wiremock::Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Paths of every request received so far, in order.
    pub async fn received_paths(&self) -> Vec<String> {
        self.received()
            .await
            .iter()
            .map(|request| request.url.path().to_string())
            .collect()
    }
}

/// Fluent builder for one stub.
pub struct StubBuilder<'a> {
    server: &'a WiremockServer,
    mock: MockBuilder,
    response: ResponseTemplate,
    times: Option<u64>,
}

impl StubBuilder<'_> {
    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &'static str) -> Self {
        self.mock = self.mock.and(header(name, value));
        self
    }

    #[must_use]
    pub fn with_query_param(mut self, name: &str, value: &str) -> Self {
        self.mock = self.mock.and(query_param(name, value));
        self
    }

    #[must_use]
    pub fn without_query_param(mut self, name: &str) -> Self {
        self.mock = self.mock.and(query_param_is_missing(name));
        self
    }

    #[must_use]
    pub fn respond_with_json(mut self, body: Value) -> Self {
        self.response = ResponseTemplate::new(200).set_body_json(body);
        self
    }

    #[must_use]
    pub fn respond_with_body(mut self, body: &str) -> Self {
        self.response = ResponseTemplate::new(200).set_body_string(body);
        self
    }

    #[must_use]
    pub fn respond_with_status(mut self, status: u16) -> Self {
        self.response = ResponseTemplate::new(status);
        self
    }

    /// Status with a text body.
    #[must_use]
    pub fn respond_with_status_body(mut self, status: u16, body: &str) -> Self {
        self.response = ResponseTemplate::new(status).set_body_string(body);
        self
    }

    /// Fail the test on drop unless the stub matched exactly `times` times.
    #[must_use]
    pub fn expect_times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    pub async fn mount(self) {
        let mut mock = self.mock.respond_with(self.response);
        if let Some(times) = self.times {
            mock = mock.expect(times);
        }
        mock.mount(self.server).await;
    }
}
