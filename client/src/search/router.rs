//! Mapping from logical operations to URL paths.

use super::types::{AccountCredentials, Database, QueryParams, ResultShape};
use urlencoding::encode;

const ROOT: &str = "searchapi";
const ROOT_NOESB: &str = "searchapi-noesb";

/// Stateless mapping from an operation to its path on the service.
#[derive(Debug, Clone, Copy)]
pub struct EndpointRouter {
    noesb: bool,
}

impl EndpointRouter {
    #[must_use]
    pub const fn new(noesb: bool) -> Self {
        Self { noesb }
    }

    /// Root path segment, with or without the ESB tier.
    #[must_use]
    pub const fn root(&self) -> &'static str {
        if self.noesb {
            ROOT_NOESB
        } else {
            ROOT
        }
    }

    /// Path for a search-family request.
    #[must_use]
    pub fn route(&self, db: Database, shape: &ResultShape) -> String {
        let root = self.root();
        let db = db.as_str();
        match shape {
            ResultShape::Metadata(field) => format!("/{root}/metadata/{db}/{}", encode(field)),
            ResultShape::Lookup(id) => format!("/{root}/{db}/{}", encode(id)),
            ResultShape::Tally(_) => format!("/{root}/{db}/tally"),
            ResultShape::RecordIds => format!("/{root}/{db}/recordids"),
            ResultShape::Count => format!("/{root}/{db}/counts"),
            ResultShape::Records => format!("/{root}/{db}/"),
        }
    }

    /// Path for the authenticate call. Carries the password, so it must
    /// never be logged; use [`EndpointRouter::authenticate_root`] instead.
    #[must_use]
    pub fn authenticate(&self, account: &AccountCredentials) -> String {
        format!(
            "{}/{}/{}/{}",
            self.authenticate_root(),
            encode(&account.username),
            encode(&account.password),
            encode(&account.app)
        )
    }

    /// Authenticate path without the account segments.
    #[must_use]
    pub fn authenticate_root(&self) -> String {
        format!("/{}/authenticate", self.root())
    }
}

/// Append `params` as a query string, percent-encoding keys and values.
#[must_use]
pub fn with_query(path: &str, params: &QueryParams) -> String {
    if params.is_empty() {
        return path.to_string();
    }
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{path}?{query}")
}
