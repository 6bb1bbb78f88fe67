//! Subscriber setup for binaries embedding the client.

use crate::config::LoggingConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

/// Filter for the configured level; `debug` forces the debug level.
///
/// # Errors
/// Returns an error if the level is not a valid filter directive.
pub fn filter(config: &LoggingConfig, debug: bool) -> Result<EnvFilter, ParseError> {
    let directive = if debug { "debug" } else { config.level.as_str() };
    EnvFilter::try_new(directive)
}

/// Install a fmt subscriber writing to stderr. Stdout is left for results.
///
/// # Errors
/// Returns an error if the level is invalid or a global subscriber is
/// already installed.
pub fn init(
    config: &LoggingConfig,
    debug: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(config, debug)?)
        .with_writer(std::io::stderr)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    fn level(level: &str) -> LoggingConfig {
        LoggingConfig {
            level: level.to_string(),
        }
    }

    #[test]
    fn uses_configured_level() {
        let filter = filter(&level("warn"), false).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn debug_flag_overrides_level() {
        let filter = filter(&level("error"), true).unwrap();
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn accepts_target_directives() {
        assert!(filter(&level("infogroup_search=debug,warn"), false).is_ok());
    }
}
