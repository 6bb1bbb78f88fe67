//! Request and result types for search operations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// User-supplied search constraints: field name to value.
pub type Criteria = BTreeMap<String, String>;

/// Fully built query parameters, every value already stringified.
pub type QueryParams = BTreeMap<String, String>;

/// Record database to query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    #[default]
    UsConsumer,
    UsBusiness,
}

impl Database {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UsConsumer => "usconsumer",
            Self::UsBusiness => "usbusiness",
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Database {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "usconsumer" => Ok(Self::UsConsumer),
            "usbusiness" => Ok(Self::UsBusiness),
            _ => Err(OptionsError::UnknownDatabase(s.to_string())),
        }
    }
}

/// What a call asks the service for. Exactly one shape is active per call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// A page of matching records.
    #[default]
    Records,
    /// The number of matching records.
    Count,
    /// Metadata describing one field.
    Metadata(String),
    /// A single record by id.
    Lookup(String),
    /// Record counts grouped by the values of one field.
    Tally(String),
    /// Only the ids of matching records.
    RecordIds,
}

impl ResultShape {
    /// Build a shape from the individual request flags.
    ///
    /// At most one of `metadata`, `id`, `tally`, `ids` may be set, and
    /// `counts` only combines with a plain search.
    ///
    /// # Errors
    /// Returns [`OptionsError::ConflictingShape`] naming the flags that were
    /// set together.
    pub fn from_flags(
        counts: bool,
        metadata: Option<String>,
        id: Option<String>,
        tally: Option<String>,
        ids: bool,
    ) -> Result<Self, OptionsError> {
        let mut active = Vec::new();
        if counts {
            active.push("counts");
        }
        if metadata.is_some() {
            active.push("metadata");
        }
        if id.is_some() {
            active.push("id");
        }
        if tally.is_some() {
            active.push("tally");
        }
        if ids {
            active.push("ids");
        }
        if active.len() > 1 {
            return Err(OptionsError::ConflictingShape(active.join(", ")));
        }

        Ok(match (metadata, id, tally) {
            (Some(field), _, _) => Self::Metadata(field),
            (_, Some(id), _) => Self::Lookup(id),
            (_, _, Some(field)) => Self::Tally(field),
            _ if ids => Self::RecordIds,
            _ if counts => Self::Count,
            _ => Self::Records,
        })
    }

    /// Whether the response is a page of results and so takes a `pagesize`.
    #[must_use]
    pub const fn is_paged(&self) -> bool {
        !matches!(self, Self::Count | Self::Metadata(_) | Self::Lookup(_))
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    pub db: Database,
    pub shape: ResultShape,
    /// Return every resident instead of one record per household
    /// (consumer database only).
    pub individuals: bool,
    /// Page size; falls back to the configured default.
    pub pagesize: Option<u32>,
    /// Answer from the cache only.
    pub onlycache: bool,
}

impl SearchOptions {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ResultShape) -> Self {
        self.shape = shape;
        self
    }

    #[must_use]
    pub const fn with_pagesize(mut self, pagesize: u32) -> Self {
        self.pagesize = Some(pagesize);
        self
    }

    #[must_use]
    pub const fn with_individuals(mut self, individuals: bool) -> Self {
        self.individuals = individuals;
        self
    }

    #[must_use]
    pub const fn only_cache(mut self) -> Self {
        self.onlycache = true;
        self
    }
}

/// Errors in per-call options.
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("conflicting result shape flags: {0}")]
    ConflictingShape(String),
    #[error("unknown database '{0}'")]
    UnknownDatabase(String),
}

/// A decoded response, as returned to callers and stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SearchResult {
    Count(u64),
    Tally(BTreeMap<String, u64>),
    Document(serde_json::Value),
    Raw(String),
}

impl SearchResult {
    #[must_use]
    pub const fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_tally(&self) -> Option<&BTreeMap<String, u64>> {
        match self {
            Self::Tally(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_document(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Document(v) => Some(v),
            _ => None,
        }
    }
}

/// Account used to obtain API keys from the authenticate endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountCredentials {
    pub username: String,
    pub password: String,
    pub app: String,
}

impl fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("app", &self.app)
            .finish()
    }
}
