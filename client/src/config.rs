use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Client configuration loaded from multiple sources.
///
/// Configuration is loaded in priority order (lowest to highest):
/// 1. Struct defaults
/// 2. infogroup.yaml file (if exists)
/// 3. Environment variables with IG_ prefix (always wins)
///
/// Keys that are not recognized are ignored, so unrelated `IG_*` variables
/// never break loading.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Service environment; selects the API host and the credential file.
    #[serde(default)]
    pub env: Environment,

    /// Bypass the ESB routing tier (`/searchapi-noesb` root).
    #[serde(default)]
    pub noesb: bool,

    /// Response format requested from the service.
    #[serde(default)]
    pub format: Format,

    /// User-Agent header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Verbose request and cache logging.
    #[serde(default)]
    pub debug: bool,

    /// Return response bodies unparsed.
    #[serde(default)]
    pub raw: bool,

    /// Answer from the cache only; never contact the service.
    #[serde(default)]
    pub onlycache: bool,

    /// Connection scheme (default: https).
    #[serde(default)]
    pub scheme: Scheme,

    /// Search radius in miles used when a `zip` criterion has no `miles`.
    #[serde(default = "default_radius")]
    pub default_radius: u32,

    /// Page size used when a search does not specify one.
    #[serde(default = "default_pagesize")]
    pub default_pagesize: u32,

    /// Age after which a persisted API key is renewed locally.
    /// The service expires keys after 24 hours, so renewal is normally
    /// driven by 401 responses before this age is reached.
    #[serde(default = "default_key_lifetime_hours")]
    pub key_lifetime_hours: u32,

    /// Explicit base URL, overriding the host derived from `env` and `scheme`.
    pub base_url: Option<String>,

    /// Pre-issued API key. Used as-is and never persisted.
    pub apikey: Option<String>,

    /// Account used to obtain API keys.
    pub username: Option<String>,

    /// Password for `username`.
    pub password: Option<String>,

    /// Application name reported to the authenticate endpoint.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Directory holding persisted API keys (default: `$HOME/.infogroup`).
    pub credentials_dir: Option<String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level filter (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Service environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    #[default]
    Prod,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }

    /// Suffix of the `apiservices` host name for this environment.
    #[must_use]
    pub const fn host_suffix(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "",
        }
    }
}

/// Response format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Xml,
}

impl Format {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }

    /// Value of the `Accept` header for this format.
    #[must_use]
    pub const fn accept(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
        }
    }
}

/// Connection scheme.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    #[default]
    Https,
}

impl Scheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

/// Error returned when a string does not name a known variant.
#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

macro_rules! impl_str_enum {
    ($ty:ty, $kind:literal, [$($variant:ident),+]) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case(Self::$variant.as_str()) {
                        return Ok(Self::$variant);
                    }
                )+
                Err(ParseEnumError {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

impl_str_enum!(Environment, "environment", [Dev, Test, Prod]);
impl_str_enum!(Format, "format", [Json, Xml]);
impl_str_enum!(Scheme, "scheme", [Http, Https]);

// These functions cannot be const because serde uses function pointers for defaults
#[allow(clippy::missing_const_for_fn)]
fn default_radius() -> u32 {
    5
}

#[allow(clippy::missing_const_for_fn)]
fn default_pagesize() -> u32 {
    10
}

#[allow(clippy::missing_const_for_fn)]
fn default_key_lifetime_hours() -> u32 {
    72
}

fn default_user_agent() -> String {
    format!("infogroup-search/{}", env!("CARGO_PKG_VERSION"))
}

fn default_app_name() -> String {
    "infogroup-search".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            noesb: false,
            format: Format::default(),
            user_agent: default_user_agent(),
            debug: false,
            raw: false,
            onlycache: false,
            scheme: Scheme::default(),
            default_radius: default_radius(),
            default_pagesize: default_pagesize(),
            key_lifetime_hours: default_key_lifetime_hours(),
            base_url: None,
            apikey: None,
            username: None,
            password: None,
            app_name: default_app_name(),
            credentials_dir: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ClientConfig {
    /// Load configuration from all sources.
    ///
    /// Sources are merged in priority order:
    /// 1. Struct defaults (lowest)
    /// 2. infogroup.yaml file (if exists)
    /// 3. Environment variables with IG_ prefix (highest)
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("infogroup.yaml")
    }

    /// Load configuration with a custom YAML file path.
    ///
    /// # Errors
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load_from(yaml_path: &str) -> Result<Self, ConfigError> {
        let config = Self::figment(yaml_path).extract::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Load without validation, for callers that layer further overrides
    /// (such as command-line flags) before validating.
    ///
    /// # Errors
    /// Returns an error if the sources cannot be merged or extracted.
    pub fn load_unvalidated(yaml_path: &str) -> Result<Self, ConfigError> {
        Ok(Self::figment(yaml_path).extract::<Self>()?)
    }

    fn figment(yaml_path: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Yaml::file(yaml_path))
            .merge(Env::prefixed("IG_").split("__"))
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Either a ready key or the means to obtain one
        let has_account = non_empty(self.username.as_deref()) && non_empty(self.password.as_deref());
        if !non_empty(self.apikey.as_deref()) && !has_account {
            return Err(ConfigError::Validation(
                "an API key or both username and password are required. Set IG_APIKEY, or IG_USERNAME and IG_PASSWORD, or configure them in infogroup.yaml.".into(),
            ));
        }

        if self.default_pagesize == 0 {
            return Err(ConfigError::Validation(
                "default_pagesize cannot be 0".into(),
            ));
        }

        if self.default_radius == 0 {
            return Err(ConfigError::Validation("default_radius cannot be 0".into()));
        }

        if self.key_lifetime_hours == 0 {
            return Err(ConfigError::Validation(
                "key_lifetime_hours cannot be 0".into(),
            ));
        }

        if self.app_name.trim().is_empty() {
            return Err(ConfigError::Validation("app_name cannot be empty".into()));
        }

        if let Some(base_url) = &self.base_url {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "base_url '{base_url}' must start with http:// or https://"
                )));
            }
        }

        Ok(())
    }

    /// Base URL of the service: the explicit override, or
    /// `{scheme}://apiservices{env}.infogroup.com`.
    #[must_use]
    pub fn service_url(&self) -> String {
        self.base_url.as_ref().map_or_else(
            || {
                format!(
                    "{}://apiservices{}.infogroup.com",
                    self.scheme.as_str(),
                    self.env.host_suffix()
                )
            },
            |url| url.trim_end_matches('/').to_string(),
        )
    }
}

fn non_empty(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}
