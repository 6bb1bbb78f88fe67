//! Search client: parameters, cache, credential, request, decode.

use super::error::SearchError;
use super::params::{attach_api_key, ParamBuilder};
use super::router::{with_query, EndpointRouter};
use super::types::{
    AccountCredentials, Criteria, Database, QueryParams, ResultShape, SearchOptions, SearchResult,
};
use crate::cache::ResultCache;
use crate::config::{ClientConfig, Format};
use crate::credentials::{CredentialManager, CredentialStore, FileCredentialStore, KeyIssuer};
use crate::transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
use async_trait::async_trait;
use ig_cache_key::CacheKey;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

const CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Client for the record-search service.
///
/// Every search-family operation runs the same sequence: build parameters,
/// consult the cache, obtain a key, send, decode, cache. A 401 triggers at
/// most one key renewal and retry per call.
pub struct SearchClient {
    config: ClientConfig,
    base_url: String,
    params: ParamBuilder,
    router: EndpointRouter,
    transport: Arc<dyn Transport>,
    cache: Option<Arc<dyn ResultCache>>,
    credentials: CredentialManager,
}

/// Builder for [`SearchClient`]. Collaborators left unset get their
/// production defaults.
pub struct SearchClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn ResultCache>>,
    store: Option<Arc<dyn CredentialStore>>,
}

impl SearchClientBuilder {
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Validate the configuration and assemble the client. No network
    /// traffic happens until the first operation.
    ///
    /// # Errors
    /// [`SearchError::Configuration`] for invalid configuration;
    /// [`SearchError::CredentialStore`] if no store was given and the
    /// default location cannot be determined.
    pub fn build(self) -> Result<SearchClient, SearchError> {
        let config = self.config;
        config.validate()?;

        let store: Arc<dyn CredentialStore> = match (self.store, &config.credentials_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileCredentialStore::new(dir)),
            (None, None) => Arc::new(FileCredentialStore::in_home()?),
        };

        let account = match (&config.username, &config.password) {
            (Some(username), Some(password)) => Some(AccountCredentials {
                username: username.clone(),
                password: password.clone(),
                app: config.app_name.clone(),
            }),
            _ => None,
        };

        let lifetime = chrono::Duration::hours(i64::from(config.key_lifetime_hours));
        let mut credentials = CredentialManager::new(config.env, store, account, lifetime);
        if let Some(api_key) = config.apikey.as_deref().filter(|k| !k.trim().is_empty()) {
            credentials = credentials.with_api_key(api_key);
        }

        let client = SearchClient {
            base_url: config.service_url(),
            params: ParamBuilder::new(config.default_radius, config.default_pagesize),
            router: EndpointRouter::new(config.noesb),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpTransport::new())),
            cache: self.cache,
            credentials,
            config,
        };

        tracing::debug!(
            base_url = %client.base_url,
            env = %client.config.env,
            format = %client.config.format,
            cached = client.cache.is_some(),
            "Search client ready"
        );
        Ok(client)
    }
}

impl SearchClient {
    #[must_use]
    pub fn builder(config: ClientConfig) -> SearchClientBuilder {
        SearchClientBuilder {
            config,
            transport: None,
            cache: None,
            store: None,
        }
    }

    /// Client with production collaborators and no cache.
    ///
    /// # Errors
    /// See [`SearchClientBuilder::build`].
    pub fn from_config(config: ClientConfig) -> Result<Self, SearchError> {
        Self::builder(config).build()
    }

    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub const fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn consumer_search(
        &self,
        criteria: &Criteria,
        options: SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        self.execute(criteria, &SearchOptions { db: Database::UsConsumer, ..options })
            .await
    }

    pub async fn consumer_count(
        &self,
        criteria: &Criteria,
        options: SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        let options = SearchOptions {
            db: Database::UsConsumer,
            shape: ResultShape::Count,
            ..options
        };
        self.execute(criteria, &options).await
    }

    pub async fn business_search(
        &self,
        criteria: &Criteria,
        options: SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        self.execute(criteria, &SearchOptions { db: Database::UsBusiness, ..options })
            .await
    }

    pub async fn business_count(
        &self,
        criteria: &Criteria,
        options: SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        let options = SearchOptions {
            db: Database::UsBusiness,
            shape: ResultShape::Count,
            ..options
        };
        self.execute(criteria, &options).await
    }

    pub async fn consumer_metadata(&self, field: &str) -> Result<Option<SearchResult>, SearchError> {
        self.metadata(Database::UsConsumer, field).await
    }

    pub async fn business_metadata(&self, field: &str) -> Result<Option<SearchResult>, SearchError> {
        self.metadata(Database::UsBusiness, field).await
    }

    pub async fn consumer_lookup(&self, id: &str) -> Result<Option<SearchResult>, SearchError> {
        self.lookup(Database::UsConsumer, id).await
    }

    pub async fn business_lookup(&self, id: &str) -> Result<Option<SearchResult>, SearchError> {
        self.lookup(Database::UsBusiness, id).await
    }

    /// Record counts grouped by the values of `field`.
    pub async fn tally(
        &self,
        db: Database,
        criteria: &Criteria,
        field: &str,
        options: SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        let options = SearchOptions {
            db,
            shape: ResultShape::Tally(field.to_string()),
            ..options
        };
        self.execute(criteria, &options).await
    }

    /// Ids of the matching records.
    pub async fn record_ids(
        &self,
        db: Database,
        criteria: &Criteria,
        options: SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        let options = SearchOptions {
            db,
            shape: ResultShape::RecordIds,
            ..options
        };
        self.execute(criteria, &options).await
    }

    async fn metadata(
        &self,
        db: Database,
        field: &str,
    ) -> Result<Option<SearchResult>, SearchError> {
        let options = SearchOptions::new(db).with_shape(ResultShape::Metadata(field.to_string()));
        self.execute(&Criteria::new(), &options).await
    }

    async fn lookup(&self, db: Database, id: &str) -> Result<Option<SearchResult>, SearchError> {
        let options = SearchOptions::new(db).with_shape(ResultShape::Lookup(id.to_string()));
        self.execute(&Criteria::new(), &options).await
    }

    /// Make sure a usable key is loaded, renewing it when `force` is set or
    /// the current one is missing or too old.
    ///
    /// Operations do this on demand; calling it up front surfaces
    /// authentication problems before the first search.
    ///
    /// # Errors
    /// See [`CredentialManager::ensure_valid`].
    pub async fn ensure_credential(&self, force: bool) -> Result<(), SearchError> {
        self.credentials.ensure_valid(force, self).await.map(|_| ())
    }

    /// Run one search-family request.
    ///
    /// Returns `Ok(None)` only when the cache is the sole allowed source
    /// (`onlycache`) and it has no entry.
    ///
    /// # Errors
    /// [`SearchError::AuthenticationFailure`] when the key is rejected after
    /// one renewal, [`SearchError::TransportFailure`] for other non-200
    /// statuses, and decode, transport, cache, or store errors.
    pub async fn execute(
        &self,
        criteria: &Criteria,
        options: &SearchOptions,
    ) -> Result<Option<SearchResult>, SearchError> {
        let params = self.params.build(criteria, options, None);
        let key = CacheKey::derive(&params, options.db.as_str(), self.config.format.as_str())?;

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&key).await? {
                tracing::debug!(cache_key = %key, ?params, "Cache hit");
                return Ok(Some(hit));
            }
        }

        if options.onlycache || self.config.onlycache {
            tracing::debug!(cache_key = %key, "Cache miss, onlycache set; not contacting service");
            return Ok(None);
        }

        let path = self.router.route(options.db, &options.shape);
        let mut api_key = self.credentials.ensure_valid(false, self).await?;
        let mut already_retried = false;

        loop {
            let response = self.send_signed(&path, &params, &api_key).await?;

            match response.status {
                200 => {
                    let result = self.decode(&path, &options.shape, response.body)?;
                    if let Some(cache) = &self.cache {
                        cache.set(&key, &result).await?;
                        tracing::debug!(cache_key = %key, ?params, "Cached result");
                    }
                    return Ok(Some(result));
                }
                401 if !already_retried => {
                    tracing::info!(path = %path, "API key rejected, renewing");
                    self.credentials.mark_expired(&api_key).await;
                    api_key = self.credentials.renew_rejected(&api_key, self).await?;
                    already_retried = true;
                }
                401 => {
                    tracing::warn!(path = %path, "API key rejected after renewal, giving up");
                    return Err(SearchError::AuthenticationFailure { path });
                }
                status => {
                    tracing::warn!(path = %path, status, "Search request failed");
                    return Err(SearchError::TransportFailure {
                        status,
                        body: response.body,
                        path,
                    });
                }
            }
        }
    }

    async fn send_signed(
        &self,
        path: &str,
        params: &QueryParams,
        api_key: &str,
    ) -> Result<TransportResponse, SearchError> {
        let mut signed = params.clone();
        attach_api_key(&mut signed, api_key);

        let request = TransportRequest::get(&self.base_url, with_query(path, &signed))
            .with_headers(self.headers(self.config.format));
        tracing::debug!(base_url = %self.base_url, path = %path, "Sending request");

        Ok(self.transport.send(request).await?)
    }

    /// Ask the service for a new API key.
    ///
    /// Returns `Ok(None)` when the account is rejected (401/403) or the
    /// response carries no `ApiKey`. Results are never cached.
    ///
    /// # Errors
    /// [`SearchError::TransportFailure`] for other non-200 statuses;
    /// [`SearchError::Decode`] for a 200 whose body is not JSON.
    pub async fn authenticate(
        &self,
        account: &AccountCredentials,
    ) -> Result<Option<String>, SearchError> {
        let path = self.router.authenticate_root();
        let request = TransportRequest::get(&self.base_url, self.router.authenticate(account))
            .with_headers(self.headers(Format::Json));
        tracing::debug!(path = %path, username = %account.username, "Requesting API key");

        let response = self.transport.send(request).await?;
        match response.status {
            200 => {
                let document: Value = serde_json::from_str(&response.body)
                    .map_err(|source| SearchError::Decode { path, source })?;
                Ok(document.get("ApiKey").and_then(scalar_string).filter(|k| !k.is_empty()))
            }
            status @ (401 | 403) => {
                tracing::warn!(path = %path, status, "Account rejected by authenticate endpoint");
                Ok(None)
            }
            status => Err(SearchError::TransportFailure {
                status,
                body: response.body,
                path,
            }),
        }
    }

    fn headers(&self, format: Format) -> Vec<(String, String)> {
        vec![
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            ("Accept".to_string(), format.accept().to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
        ]
    }

    fn decode(
        &self,
        path: &str,
        shape: &ResultShape,
        body: String,
    ) -> Result<SearchResult, SearchError> {
        if self.config.raw || self.config.format == Format::Xml {
            return Ok(SearchResult::Raw(body));
        }

        let document: Value = serde_json::from_str(&body).map_err(|source| SearchError::Decode {
            path: path.to_string(),
            source,
        })?;

        match shape {
            ResultShape::Count => Ok(SearchResult::Count(match_count(&document))),
            ResultShape::Tally(_) => parse_tally(&document)
                .map(SearchResult::Tally)
                .map_err(|reason| SearchError::UnexpectedResponse {
                    path: path.to_string(),
                    reason,
                }),
            _ => Ok(SearchResult::Document(document)),
        }
    }
}

#[async_trait]
impl KeyIssuer for SearchClient {
    async fn issue_key(&self, account: &AccountCredentials) -> Result<Option<String>, SearchError> {
        self.authenticate(account).await
    }

    fn endpoint(&self) -> String {
        self.router.authenticate_root()
    }
}

impl fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchClient")
            .field("base_url", &self.base_url)
            .field("router", &self.router)
            .field("params", &self.params)
            .field("cached", &self.cache.is_some())
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

/// `MatchCount` of a count response; absent or non-numeric counts as 0.
fn match_count(document: &Value) -> u64 {
    match document.get("MatchCount") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Tally entries look like `{"RecordCount": 12, "<field>": "<value>"}`.
/// The grouping field is whichever key of the first entry is not
/// `RecordCount`.
fn parse_tally(document: &Value) -> Result<BTreeMap<String, u64>, String> {
    let entries = document
        .get("Data")
        .and_then(Value::as_array)
        .ok_or_else(|| "tally response has no Data array".to_string())?;

    let Some(first) = entries.first() else {
        return Ok(BTreeMap::new());
    };
    let key_field = first
        .as_object()
        .and_then(|entry| entry.keys().find(|k| !k.contains("RecordCount")))
        .ok_or_else(|| "tally entry has no grouping field".to_string())?;

    entries
        .iter()
        .map(|entry| {
            let value = entry
                .get(key_field)
                .and_then(scalar_string)
                .ok_or_else(|| format!("tally entry is missing {key_field}"))?;
            let count = match entry.get("RecordCount") {
                Some(Value::Number(n)) => n.as_u64(),
                Some(Value::String(s)) => s.trim().parse().ok(),
                _ => None,
            }
            .ok_or_else(|| format!("tally entry for {value} has no RecordCount"))?;
            Ok((value, count))
        })
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
