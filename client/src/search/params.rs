//! Query parameter construction.

use super::types::{Criteria, Database, QueryParams, ResultShape, SearchOptions};
use ig_cache_key::API_KEY_PARAM;

const ZIP: &str = "zip";
const MILES: &str = "miles";
const RADIUS_POSTAL_CODE: &str = "radiuspostalcode";
const RADIUS_MILES: &str = "radiusmiles";
const PAGESIZE: &str = "pagesize";

/// Consumer targeting thresholds sent with every non-metadata consumer query.
const CONSUMER_FLAGS: [(&str, &str); 3] = [
    ("LifestyleMinimumLevel", "7"),
    ("TargetReadyMinimumLevel", "9"),
    ("LifestyleOperator", "OR"),
];

/// Turns caller criteria and options into the endpoint-specific parameter set.
#[derive(Debug, Clone, Copy)]
pub struct ParamBuilder {
    default_radius: u32,
    default_pagesize: u32,
}

impl ParamBuilder {
    #[must_use]
    pub const fn new(default_radius: u32, default_pagesize: u32) -> Self {
        Self {
            default_radius,
            default_pagesize,
        }
    }

    /// Build the full parameter set. The caller's criteria are never modified.
    ///
    /// `api_key` is attached when given; cache lookups build without it.
    #[must_use]
    pub fn build(
        &self,
        criteria: &Criteria,
        options: &SearchOptions,
        api_key: Option<&str>,
    ) -> QueryParams {
        let mut params = criteria.clone();

        if let ResultShape::Tally(field) = &options.shape {
            params.insert(format!("tally{field}"), true.to_string());
        }

        if let Some(zip) = params.remove(ZIP) {
            let miles = params
                .remove(MILES)
                .unwrap_or_else(|| self.default_radius.to_string());
            params.insert(RADIUS_POSTAL_CODE.to_string(), zip);
            params.insert(RADIUS_MILES.to_string(), miles);
        }

        if let Some(key) = api_key {
            attach_api_key(&mut params, key);
        }

        if options.shape.is_paged() {
            let pagesize = options.pagesize.unwrap_or(self.default_pagesize);
            params.insert(PAGESIZE.to_string(), pagesize.to_string());
        }

        if options.db == Database::UsConsumer && !matches!(options.shape, ResultShape::Metadata(_))
        {
            params.insert(
                "ReturnAllResidents".to_string(),
                options.individuals.to_string(),
            );
            for (name, value) in CONSUMER_FLAGS {
                params.insert(name.to_string(), value.to_string());
            }
        }

        params
    }
}

/// Set the `apikey` parameter, replacing any previous value.
pub fn attach_api_key(params: &mut QueryParams, api_key: &str) {
    params.insert(API_KEY_PARAM.to_string(), api_key.to_string());
}
