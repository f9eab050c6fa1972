//! Logging setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::DEFAULT_LOG_LEVEL;
use crate::error::{AuthError, Result};

/// Filter used when neither `RUST_LOG` nor a non-default level is given
pub const DEFAULT_LOG_FILTER: &str = "info,thriftserver_auth=debug";

/// Filter directives for a configured log level
///
/// The default level expands to [`DEFAULT_LOG_FILTER`]; anything else is used
/// verbatim, so full directive strings work too.
pub fn filter_directives(log_level: &str) -> String {
    let level = log_level.trim();
    if level.is_empty() || level.eq_ignore_ascii_case(DEFAULT_LOG_LEVEL) {
        DEFAULT_LOG_FILTER.to_string()
    } else {
        level.to_string()
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `log_level` when set.
pub fn init_logging(log_level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(filter_directives(log_level))
            .map_err(|e| AuthError::config("log_level", e.to_string()))?,
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| AuthError::config("log_level", format!("logging already initialised: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level_expands() {
        assert_eq!(filter_directives("info"), DEFAULT_LOG_FILTER);
        assert_eq!(filter_directives(""), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_explicit_level_is_verbatim() {
        assert_eq!(filter_directives("warn"), "warn");
        assert_eq!(
            filter_directives("thriftserver_auth::auth=trace"),
            "thriftserver_auth::auth=trace"
        );
    }

    #[test]
    fn test_directives_parse() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }
}
