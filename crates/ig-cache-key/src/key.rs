//! Cache key: a validated, type-safe wrapper around a request digest.
//!
//! Always exactly 64 lowercase hexadecimal characters.

use crate::{Digest, Sha256, API_KEY_PARAM};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A validated cache key. Guaranteed to be 64 lowercase hex characters.
///
/// Construct via [`CacheKey::derive`] (from request parameters) or
/// [`CacheKey::from_str`] (from a string, e.g. read back from a cache listing).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

/// Errors from cache key derivation or parsing.
#[derive(Debug, thiserror::Error)]
pub enum CacheKeyError {
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] serde_json::Error),
    #[error("invalid cache key: {reason}")]
    Invalid { reason: &'static str },
}

/// Length of a hex-encoded SHA-256 digest.
const KEY_LENGTH: usize = 64;

impl CacheKey {
    /// Derive the key for a parameter set, database, and response format.
    ///
    /// The `apikey` parameter is dropped. Parameters are nested under their
    /// own object so a criteria field named `db` or `format` cannot collide
    /// with the request-level values.
    ///
    /// Only query parameters take part. Route segments such as a lookup id
    /// or a metadata field name do not, and neither does the result shape,
    /// so requests that differ only there share a key.
    ///
    /// # Errors
    /// Returns [`CacheKeyError::Canonicalization`] if the document cannot be
    /// serialized in canonical form.
    pub fn derive(
        params: &BTreeMap<String, String>,
        db: &str,
        format: &str,
    ) -> Result<Self, CacheKeyError> {
        let params: Map<String, Value> = params
            .iter()
            .filter(|(name, _)| name.as_str() != API_KEY_PARAM)
            .map(|(name, value)| (name.clone(), Value::String(value.clone())))
            .collect();

        let mut document = Map::new();
        document.insert("db".to_string(), Value::String(db.to_string()));
        document.insert("format".to_string(), Value::String(format.to_string()));
        document.insert("params".to_string(), Value::Object(params));

        let canonical = serde_jcs::to_vec(&Value::Object(document))?;
        Ok(Self::from_canonical_bytes(&canonical))
    }

    pub(crate) fn from_canonical_bytes(bytes: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(bytes)))
    }

    /// Return the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), CacheKeyError> {
        if s.len() != KEY_LENGTH {
            return Err(CacheKeyError::Invalid {
                reason: "must be exactly 64 characters",
            });
        }
        if !s
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return Err(CacheKeyError::Invalid {
                reason: "contains characters outside lowercase hex",
            });
        }
        Ok(())
    }
}

impl FromStr for CacheKey {
    type Err = CacheKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::validate(s)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for CacheKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for CacheKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
