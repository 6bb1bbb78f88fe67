//! Cache keys for Infogroup search requests.
//!
//! A cache key identifies a request by its query parameters, database, and
//! response format. The API key is left out, so cached results survive key
//! renewal.
//!
//! The key is computed as `hex(SHA-256(JCS({"db", "format", "params"})))`,
//! where JCS is the RFC 8785 canonical JSON form.

pub(crate) use sha2::{Digest, Sha256};

mod key;
pub use key::{CacheKey, CacheKeyError};

/// Query parameter that never participates in a cache key.
pub const API_KEY_PARAM: &str = "apikey";


#[cfg(test)]
mod proptests {
    use super::*;
    use std::collections::BTreeMap;
    use proptest::prelude::*;

    fn criteria() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-zA-Z]{1,12}", "[ -~]{0,16}", 0..8)
    }

    proptest! {
        /// Substituting the API key never changes the derived key
        #[test]
        fn invariant_under_api_key_substitution(
            params in criteria(),
            first in "[a-z0-9]{8,32}",
            second in "[a-z0-9]{8,32}",
        ) {
            let mut a = params.clone();
            a.insert(API_KEY_PARAM.to_string(), first);
            let mut b = params;
            b.insert(API_KEY_PARAM.to_string(), second);
            prop_assert_eq!(
                CacheKey::derive(&a, "usconsumer", "json").unwrap(),
                CacheKey::derive(&b, "usconsumer", "json").unwrap()
            );
        }

        /// Insertion order of the parameters is irrelevant
        #[test]
        fn order_independent(params in criteria()) {
            let reversed: BTreeMap<String, String> = params
                .iter()
                .rev()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            prop_assert_eq!(
                CacheKey::derive(&params, "usbusiness", "xml").unwrap(),
                CacheKey::derive(&reversed, "usbusiness", "xml").unwrap()
            );
        }

        /// Output is always 64 lowercase hex characters
        #[test]
        fn fixed_length_hex(params in criteria()) {
            let key = CacheKey::derive(&params, "usconsumer", "json").unwrap();
            prop_assert_eq!(key.as_str().len(), 64);
            prop_assert!(key.as_str().bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
        }
    }
}
