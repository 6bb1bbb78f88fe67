//! Record search against the Infogroup search service.
//!
//! [`SearchClient`] is the entry point. It composes:
//!
//! - [`ParamBuilder`]: criteria and options to query parameters
//! - [`EndpointRouter`]: result shape to URL path
//! - [`ig_cache_key::CacheKey`]: cache identity of a request
//! - [`crate::credentials::CredentialManager`]: the API key
//!
//! # Example
//!
//! ```ignore
//! use infogroup_search::{ClientConfig, SearchClient, SearchOptions};
//!
//! let client = SearchClient::from_config(ClientConfig::load()?)?;
//! let criteria = [("state".to_string(), "CA".to_string())].into();
//! let count = client.business_count(&criteria, SearchOptions::default()).await?;
//! ```

mod client;
mod error;
mod params;
mod router;
mod types;

pub use client::{SearchClient, SearchClientBuilder};
pub use error::SearchError;
pub use params::{attach_api_key, ParamBuilder};
pub use router::{with_query, EndpointRouter};
pub use types::{
    AccountCredentials, Criteria, Database, OptionsError, QueryParams, ResultShape,
    SearchOptions, SearchResult,
};
