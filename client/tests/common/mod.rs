//! Common test utilities for integration tests.
//!
//! - [`http_mock::MockHttpServer`] - wiremock wrapper for stubbing the search service
//! - [`client_for`] - a search client wired to a mock server

#![allow(dead_code)]

pub mod http_mock;

use infogroup_search::config::{ClientConfig, Environment};
use infogroup_search::credentials::{Credential, MemoryCredentialStore};
use infogroup_search::transport::HttpTransport;
use infogroup_search::SearchClient;
use std::sync::Arc;

pub const USERNAME: &str = "analyst";
pub const PASSWORD: &str = "s3cret";
pub const APP: &str = "integration";

/// Configuration pointing at `base_url` with a full account.
pub fn config_for(base_url: &str) -> ClientConfig {
    ClientConfig {
        env: Environment::Test,
        base_url: Some(base_url.to_string()),
        username: Some(USERNAME.to_string()),
        password: Some(PASSWORD.to_string()),
        app_name: APP.to_string(),
        ..ClientConfig::default()
    }
}

/// Credential store holding a fresh `key` for the test environment.
pub fn store_with_key(key: &str) -> Arc<MemoryCredentialStore> {
    let store = Arc::new(MemoryCredentialStore::new());
    store.insert(Environment::Test, Credential::new(key, chrono::Utc::now()));
    store
}

/// Client using real HTTP against `base_url` and an in-memory credential store.
#[allow(clippy::expect_used)]
pub fn client_for(config: ClientConfig, store: Arc<MemoryCredentialStore>) -> SearchClient {
    SearchClient::builder(config)
        .transport(Arc::new(HttpTransport::new()))
        .credential_store(store)
        .build()
        .expect("valid test configuration")
}
